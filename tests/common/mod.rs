#![allow(dead_code)]

use modrail::{
    AttachmentGraph, AttachmentSpec, CompatibilityCatalog, CompatibilityEntry, HostType,
    InstanceId, PartBlueprint, PartKind, PartRegistry, SlotId, SlotTemplate, TreeConfig,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn catalog(kinds: &[&str]) -> CompatibilityCatalog {
    CompatibilityCatalog::new(
        kinds
            .iter()
            .map(|kind| CompatibilityEntry::enabled(PartKind::of(*kind)))
            .collect(),
    )
}

/// A rifle root with an essential barrel, a sighting rail, a mount that can
/// carry a slot-bearing adapter (three levels deep via the riser), a locked
/// stock slot and an inverted-travel slide rail.
pub fn demo_registry() -> PartRegistry {
    let mut registry = PartRegistry::new();

    let mut barrel = SlotTemplate::new("barrel");
    barrel.essential = true;
    barrel.catalogs = vec![catalog(&["barrel_long", "barrel_short"])];
    barrel.default_part = Some(PartKind::of("barrel_long"));

    let mut rail = SlotTemplate::new("rail");
    rail.minimum = -5.0;
    rail.maximum = 20.0;
    rail.snap_distance = 1.0;
    rail.catalogs = vec![catalog(&["sight_a", "sight_b"])];

    let mut mount = SlotTemplate::new("mount");
    mount.catalogs = vec![catalog(&["rail_adapter"])];

    let mut stock = SlotTemplate::new("stock");
    stock.allow_client_change = false;
    stock.catalogs = vec![catalog(&["stock_a"])];

    let mut slide_rail = SlotTemplate::new("slide_rail");
    slide_rail.minimum = -6.0;
    slide_rail.maximum = 0.0;
    slide_rail.snap_distance = 2.0;
    slide_rail.catalogs = vec![catalog(&["slider", "weight"])];

    registry.add(
        PartBlueprint::new(PartKind::of("rifle")).with_capability(AttachmentSpec {
            slots: vec![barrel, rail, mount, stock, slide_rail],
        }),
    );

    let mut riser_slot = SlotTemplate::new("riser_slot");
    riser_slot.catalogs = vec![catalog(&["riser"])];
    registry.add(
        PartBlueprint::new(PartKind::of("rail_adapter"))
            .with_capability(AttachmentSpec { slots: vec![riser_slot] }),
    );

    let mut riser_rail = SlotTemplate::new("riser_rail");
    riser_rail.maximum = 4.0;
    riser_rail.snap_distance = 1.0;
    riser_rail.catalogs = vec![catalog(&["sight_a"])];
    registry.add(
        PartBlueprint::new(PartKind::of("riser"))
            .with_capability(AttachmentSpec { slots: vec![riser_rail] }),
    );

    registry.add(
        PartBlueprint::new(PartKind::of("slider"))
            .with_capability(AttachmentSpec { slots: Vec::new() })
            .with_inverted_movement(),
    );

    for kind in ["barrel_long", "barrel_short", "sight_a", "sight_b", "stock_a", "weight"] {
        registry.add(PartBlueprint::new(PartKind::of(kind)));
    }

    registry
}

pub fn server_graph() -> AttachmentGraph {
    init_logging();
    AttachmentGraph::new(HostType::Server, demo_registry())
}

pub fn server_graph_with(config: TreeConfig) -> AttachmentGraph {
    init_logging();
    AttachmentGraph::with_config(HostType::Server, demo_registry(), config)
}

pub fn replica_pair() -> (AttachmentGraph, AttachmentGraph) {
    init_logging();
    (
        AttachmentGraph::new(HostType::Server, demo_registry()),
        AttachmentGraph::new(HostType::Client, demo_registry()),
    )
}

/// Forward every queued commit from the authority to the observer.
pub fn sync(server: &mut AttachmentGraph, client: &mut AttachmentGraph) {
    for update in server.drain_commits() {
        client.apply_commit(update);
    }
}

pub fn slot_named(graph: &mut AttachmentGraph, root: InstanceId, name: &str) -> SlotId {
    graph.rebuild_now(root);
    let tree = graph.tree(root).expect("root has a tree");
    tree.flattened()
        .iter()
        .copied()
        .find(|slot_id| {
            graph
                .slot(*slot_id)
                .map(|slot| slot.name() == name)
                .unwrap_or(false)
        })
        .unwrap_or_else(|| panic!("no slot named '{name}'"))
}
