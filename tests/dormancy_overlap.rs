mod common;

use common::{replica_pair, server_graph, slot_named, sync};
use modrail::{DormancyState, GraphEvent, PartKind, SlotRequest};

#[test]
fn dormancy_changes_commit_and_replicate() {
    let (mut server, mut client) = replica_pair();
    let root = server.spawn_root(&PartKind::of("rifle")).unwrap();
    let rail = slot_named(&mut server, root, "rail");
    let sight = server.attach(rail, &PartKind::of("sight_a"), true).unwrap();
    sync(&mut server, &mut client);

    server.drain_events();
    server.set_dormancy(rail, DormancyState::Dormant);
    assert_eq!(
        server.record(sight).unwrap().dormancy(),
        DormancyState::Dormant
    );
    assert!(matches!(
        server.drain_events().as_slice(),
        [GraphEvent::DormancyChanged {
            state: DormancyState::Dormant,
            ..
        }]
    ));

    sync(&mut server, &mut client);
    assert_eq!(
        client.record(sight).unwrap().dormancy(),
        DormancyState::Dormant
    );

    // Setting the state it already has changes nothing.
    server.set_dormancy(rail, DormancyState::Dormant);
    assert!(server.drain_events().is_empty());
    assert!(server.drain_commits().is_empty());
}

#[test]
fn clients_forward_dormancy_requests() {
    let (mut server, mut client) = replica_pair();
    let root = server.spawn_root(&PartKind::of("rifle")).unwrap();
    let rail = slot_named(&mut server, root, "rail");
    let sight = server.attach(rail, &PartKind::of("sight_a"), true).unwrap();
    sync(&mut server, &mut client);

    client.set_dormancy(rail, DormancyState::Dormant);
    assert_eq!(
        client.record(sight).unwrap().dormancy(),
        DormancyState::Awake
    );
    let requests = client.drain_requests();
    assert!(matches!(
        requests.as_slice(),
        [SlotRequest::SetDormancy {
            state: DormancyState::Dormant,
            ..
        }]
    ));

    for request in requests {
        server.apply_request(request);
    }
    sync(&mut server, &mut client);
    assert_eq!(
        client.record(sight).unwrap().dormancy(),
        DormancyState::Dormant
    );
}

#[test]
fn flush_emits_the_current_state() {
    let mut graph = server_graph();
    let root = graph.spawn_root(&PartKind::of("rifle")).unwrap();
    let rail = slot_named(&mut graph, root, "rail");
    graph.attach(rail, &PartKind::of("sight_a"), true).unwrap();

    graph.drain_events();
    graph.flush_dormancy(rail);
    assert!(matches!(
        graph.drain_events().as_slice(),
        [GraphEvent::DormancyChanged {
            state: DormancyState::Awake,
            ..
        }]
    ));
}

#[test]
fn overlap_records_upsert_and_prune() {
    let mut graph = server_graph();
    let root = graph.spawn_root(&PartKind::of("rifle")).unwrap();
    let rail = slot_named(&mut graph, root, "rail");
    let mount = slot_named(&mut graph, root, "mount");
    let sight = graph.attach(rail, &PartKind::of("sight_a"), true).unwrap();
    let adapter = graph.attach(mount, &PartKind::of("rail_adapter"), true).unwrap();

    graph.record_overlap(rail, adapter, true);
    graph.record_overlap(rail, adapter, true);
    assert_eq!(graph.slot(rail).unwrap().overlaps().len(), 1);

    graph.record_overlap(rail, sight, true);
    assert_eq!(graph.slot(rail).unwrap().overlaps().len(), 2);

    // Destroying the adapter leaves a stale record; the next pass prunes it.
    graph.detach(mount);
    graph.record_overlap(rail, sight, false);
    let overlaps = graph.slot(rail).unwrap().overlaps();
    assert_eq!(overlaps.len(), 1);
    assert_eq!(overlaps[0].candidate, sight);
    assert!(!overlaps[0].overlapping);
}

#[test]
fn overlap_visibility_events_follow_the_records() {
    let mut graph = server_graph();
    let root = graph.spawn_root(&PartKind::of("rifle")).unwrap();
    let rail = slot_named(&mut graph, root, "rail");
    let mount = slot_named(&mut graph, root, "mount");
    let sight = graph.attach(rail, &PartKind::of("sight_a"), true).unwrap();
    let adapter = graph.attach(mount, &PartKind::of("rail_adapter"), true).unwrap();

    graph.record_overlap(rail, adapter, true);
    graph.record_overlap(rail, sight, false);
    graph.drain_events();
    graph.apply_overlap_visibility(rail);

    let events = graph.drain_events();
    assert!(events.contains(&GraphEvent::OverlapVisibility {
        instance: adapter,
        hidden: true,
    }));
    assert!(events.contains(&GraphEvent::OverlapVisibility {
        instance: sight,
        hidden: false,
    }));
}
