mod common;

use common::{server_graph, slot_named};
use modrail::{CompatibilityEntry, PartKind};

#[test]
fn incompatible_kind_leaves_the_slot_unchanged() {
    let mut graph = server_graph();
    let root = graph.spawn_root(&PartKind::of("rifle")).unwrap();
    let rail = slot_named(&mut graph, root, "rail");

    let sight = graph.attach(rail, &PartKind::of("sight_a"), true).unwrap();
    let result = graph.attach(rail, &PartKind::of("barrel_long"), true);
    assert_eq!(result, Some(sight));
    assert_eq!(graph.slot(rail).unwrap().current(), Some(sight));
}

#[test]
fn disabled_entry_no_longer_matches() {
    let mut graph = server_graph();
    let root = graph.spawn_root(&PartKind::of("rifle")).unwrap();
    let rail = slot_named(&mut graph, root, "rail");

    let enabled = CompatibilityEntry::enabled(PartKind::of("sight_b"));
    assert!(graph.set_slot_entry_enabled(rail, &enabled, false));
    assert_eq!(graph.attach(rail, &PartKind::of("sight_b"), true), None);

    // Matching is by value, so re-enabling names the now-disabled entry.
    let disabled = CompatibilityEntry::disabled(PartKind::of("sight_b"));
    assert!(graph.set_slot_entry_enabled(rail, &disabled, true));
    assert!(graph.attach(rail, &PartKind::of("sight_b"), true).is_some());
}

#[test]
fn toggling_an_unknown_entry_reports_no_effect() {
    let mut graph = server_graph();
    let root = graph.spawn_root(&PartKind::of("rifle")).unwrap();
    let rail = slot_named(&mut graph, root, "rail");

    let entry = CompatibilityEntry::enabled(PartKind::of("bayonet"));
    assert!(!graph.set_slot_entry_enabled(rail, &entry, true));
}

#[test]
fn attach_without_replace_keeps_an_occupied_slot() {
    let mut graph = server_graph();
    let root = graph.spawn_root(&PartKind::of("rifle")).unwrap();
    let rail = slot_named(&mut graph, root, "rail");

    let sight = graph.attach(rail, &PartKind::of("sight_a"), true).unwrap();
    let result = graph.attach(rail, &PartKind::of("sight_b"), false);
    assert_eq!(result, Some(sight));
    assert_eq!(graph.slot(rail).unwrap().current(), Some(sight));
}

#[test]
fn replacement_carries_the_rail_position() {
    let mut graph = server_graph();
    let root = graph.spawn_root(&PartKind::of("rifle")).unwrap();
    let rail = slot_named(&mut graph, root, "rail");

    let sight_a = graph.attach(rail, &PartKind::of("sight_a"), true).unwrap();
    graph.set_offset(sight_a, 5.0);

    let sight_b = graph.attach(rail, &PartKind::of("sight_b"), true).unwrap();
    assert_ne!(sight_a, sight_b);
    assert!(graph.record(sight_a).is_none());
    assert_eq!(graph.record(sight_b).unwrap().offset().current(), 5.0);
}
