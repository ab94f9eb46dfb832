//! Mutator, associator and retry behavior through the inventory facade

mod common;

use inventory_core::errors::InventoryError;
use inventory_core::model::{
    Action, Blueprint, Direction, EntityUpdate, MetricDataType, Properties,
};
use inventory_engine::Mutations;
use serde_json::json;

use common::{entity_paths, path, relationship_edges, setup, Harness};

/// tenant t / feed agent / resource type host / operation type restart
fn feed_with_types(h: &mut Harness) {
    let t = path("/t;t");
    let feed = path("/t;t/f;agent");
    let host = path("/t;t/f;agent/rt;host");
    h.inventory.create(None, Blueprint::tenant("t")).unwrap();
    h.inventory.create(Some(&t), Blueprint::feed("agent")).unwrap();
    h.inventory
        .create(Some(&feed), Blueprint::resource_type("host"))
        .unwrap();
    h.inventory
        .create(Some(&host), Blueprint::operation_type("restart"))
        .unwrap();
    h.inventory
        .create(
            Some(&path("/t;t/f;agent/rt;host/ot;restart")),
            Blueprint::data("returnType", json!("bool")),
        )
        .unwrap();
}

#[test]
fn test_data_update_reports_new_hashes_up_to_the_feed() {
    // GIVEN a feed with a resource type, an operation type and its return type
    let mut h = setup();
    feed_with_types(&mut h);
    let before = h.inventory.get(&path("/t;t/f;agent")).unwrap().identity_hash;
    assert!(before.is_some());
    h.sink.take();

    // WHEN the return type changes
    h.inventory
        .update(
            &path("/t;t/f;agent/rt;host/ot;restart/d;returnType"),
            EntityUpdate::new().with_value(json!("int")),
        )
        .unwrap();

    // THEN one hash change per hashable entity on the way up is delivered
    let delivered = h.sink.take();
    let changed = entity_paths(&delivered, Action::IdentityHashChanged);
    assert_eq!(
        changed,
        vec![
            "/t;t/f;agent",
            "/t;t/f;agent/rt;host",
            "/t;t/f;agent/rt;host/ot;restart",
            "/t;t/f;agent/rt;host/ot;restart/d;returnType",
        ]
    );
    let after = h.inventory.get(&path("/t;t/f;agent")).unwrap().identity_hash;
    assert_ne!(before, after);
}

#[test]
fn test_name_only_update_keeps_hashes() {
    // GIVEN a feed with types
    let mut h = setup();
    feed_with_types(&mut h);
    h.sink.take();

    // WHEN only a name changes
    h.inventory
        .update(
            &path("/t;t/f;agent/rt;host"),
            EntityUpdate::new().with_name("Host"),
        )
        .unwrap();

    // THEN only the update is delivered
    let delivered = h.sink.take();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].action, Action::Updated);
}

#[test]
fn test_conflicting_commits_are_retried_to_the_same_state() {
    // GIVEN two stores, one rejecting its next commits
    let mut clean = setup();
    let mut flaky = setup();
    clean.inventory.create(None, Blueprint::tenant("t")).unwrap();
    flaky.inventory.create(None, Blueprint::tenant("t")).unwrap();
    let commits_before = flaky.backend.commit_count();
    flaky.backend.fail_next_commits(3);

    // WHEN the same entity is created in both
    for h in [&mut clean, &mut flaky] {
        h.inventory
            .create(Some(&path("/t;t")), Blueprint::feed("agent"))
            .unwrap();
    }

    // THEN the flaky store committed exactly once more and ends in the same state
    assert_eq!(flaky.backend.commit_count(), commits_before + 1);
    assert_eq!(clean.backend.entities(), flaky.backend.entities());
    assert_eq!(
        clean.backend.relationships().len(),
        flaky.backend.relationships().len()
    );
    // AND the notifications were delivered once
    assert_eq!(
        entity_paths(&flaky.sink.notifications(), Action::Created),
        vec!["/t;t", "/t;t/f;agent"]
    );
}

#[test]
fn test_exhausted_retries_fail_the_operation() {
    // GIVEN a store rejecting more commits than the retry budget
    let mut h = setup();
    h.backend.fail_next_commits(100);

    // WHEN a tenant is created
    let err = h.inventory.create(None, Blueprint::tenant("t")).unwrap_err();

    // THEN the failure reports the attempts and nothing is stored
    match err {
        InventoryError::TransactionFailed { attempts, cause } => {
            assert_eq!(attempts, 6);
            assert!(cause.is_retryable());
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(h.backend.entities().is_empty());
    assert!(h.sink.is_empty());
}

#[test]
fn test_delete_of_type_in_use_deletes_nothing() {
    // GIVEN a resource in an environment typed by a type living in a feed
    let mut h = setup();
    feed_with_types(&mut h);
    h.inventory
        .create(Some(&path("/t;t")), Blueprint::environment("prod"))
        .unwrap();
    h.inventory
        .create(
            Some(&path("/t;t/e;prod")),
            Blueprint::resource("web", "/t;t/f;agent/rt;host"),
        )
        .unwrap();
    let entities = h.backend.entities().len();

    // WHEN the feed holding the type is deleted
    let err = h.inventory.delete(&path("/t;t/f;agent")).unwrap_err();

    // THEN the whole delete is refused
    assert!(matches!(err, InventoryError::TypeInUse { .. }));
    assert_eq!(h.backend.entities().len(), entities);
}

#[test]
fn test_delete_cascades_over_contained_entities() {
    // GIVEN a feed with types
    let mut h = setup();
    feed_with_types(&mut h);
    h.sink.take();

    // WHEN the feed is deleted
    h.inventory.delete(&path("/t;t/f;agent")).unwrap();

    // THEN every contained entity is gone and reported deleted once
    assert_eq!(h.backend.entities().len(), 1);
    let delivered = h.sink.take();
    let deleted = entity_paths(&delivered, Action::Deleted);
    assert_eq!(
        deleted,
        vec![
            "/t;t/f;agent",
            "/t;t/f;agent/rt;host",
            "/t;t/f;agent/rt;host/ot;restart",
            "/t;t/f;agent/rt;host/ot;restart/d;returnType",
        ]
    );
    // AND internal data links are not reported
    let edges = relationship_edges(&delivered, Action::Deleted);
    assert!(edges.iter().all(|(_, name, _)| name != "hasData"));
    assert!(edges
        .iter()
        .any(|(s, name, t)| s == "/t;t" && name == "contains" && t == "/t;t/f;agent"));
    assert!(h.backend.relationships().is_empty());
}

#[test]
fn test_metadata_pack_freezes_its_members() {
    // GIVEN a metric type incorporated by a metadata pack
    let mut h = setup();
    let t = path("/t;t");
    let cpu = path("/t;t/mt;cpu");
    let pack = path("/t;t/mp;base");
    h.inventory.create(None, Blueprint::tenant("t")).unwrap();
    h.inventory
        .create(
            Some(&t),
            Blueprint::metric_type("cpu", "percent", MetricDataType::Gauge),
        )
        .unwrap();
    h.inventory
        .create(
            Some(&t),
            Blueprint::metadata_pack("base", vec!["mt;cpu".to_string()]),
        )
        .unwrap();
    let members = h
        .inventory
        .relationships(&pack, Direction::Outgoing, &["incorporates"])
        .unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].target, cpu);

    // WHEN its defining fields change, it is deleted or membership is edited
    let update = h
        .inventory
        .update(&cpu, EntityUpdate::new().with_unit("ratio"))
        .unwrap_err();
    let delete = h.inventory.delete(&cpu).unwrap_err();
    let unlink = h
        .inventory
        .delete_relationship(&members[0].id)
        .unwrap_err();

    // THEN all of it is refused
    assert!(matches!(update, InventoryError::MetadataPackProtected { .. }));
    assert!(matches!(delete, InventoryError::MetadataPackProtected { .. }));
    assert!(matches!(unlink, InventoryError::MetadataPackProtected { .. }));

    // AND non-defining fields stay editable
    h.inventory
        .update(&cpu, EntityUpdate::new().with_name("CPU"))
        .unwrap();

    // AND deleting the pack releases the member
    h.inventory.delete(&pack).unwrap();
    h.inventory.delete(&cpu).unwrap();
}

#[test]
fn test_metadata_pack_members_must_exist_in_the_same_tenant() {
    let mut h = setup();
    let t = path("/t;t");
    h.inventory.create(None, Blueprint::tenant("t")).unwrap();
    h.inventory.create(None, Blueprint::tenant("other")).unwrap();
    h.inventory
        .create(
            Some(&path("/t;other")),
            Blueprint::metric_type("cpu", "percent", MetricDataType::Gauge),
        )
        .unwrap();

    let foreign = h
        .inventory
        .create(
            Some(&t),
            Blueprint::metadata_pack("p", vec!["/t;other/mt;cpu".to_string()]),
        )
        .unwrap_err();
    let missing = h
        .inventory
        .create(
            Some(&t),
            Blueprint::metadata_pack("p", vec!["mt;nope".to_string()]),
        )
        .unwrap_err();

    assert!(matches!(foreign, InventoryError::InvalidBlueprint { .. }));
    assert!(missing.is_not_found());
    assert!(h.inventory.find(&path("/t;t/mp;p")).unwrap().is_none());
}

#[test]
fn test_structured_data_roles_depend_on_the_owner() {
    // GIVEN a resource
    let mut h = setup();
    let t = path("/t;t");
    let web = path("/t;t/e;prod/r;web");
    h.inventory.create(None, Blueprint::tenant("t")).unwrap();
    h.inventory
        .create(Some(&t), Blueprint::environment("prod"))
        .unwrap();
    h.inventory
        .create(Some(&t), Blueprint::resource_type("host"))
        .unwrap();
    h.inventory
        .create(
            Some(&path("/t;t/e;prod")),
            Blueprint::resource("web", "/t;t/rt;host"),
        )
        .unwrap();

    // WHEN data is attached under a resource role and under a foreign role
    h.inventory
        .create(
            Some(&web),
            Blueprint::data("configuration", json!({ "port": 8080 })),
        )
        .unwrap();
    let err = h
        .inventory
        .create(Some(&web), Blueprint::data("returnType", json!("bool")))
        .unwrap_err();

    // THEN only the resource role is accepted
    assert!(matches!(err, InventoryError::InvalidBlueprint { .. }));
    let has_data = h
        .inventory
        .relationships(&web, Direction::Outgoing, &["hasData"])
        .unwrap();
    assert_eq!(has_data.len(), 1);
    assert_eq!(has_data[0].target, path("/t;t/e;prod/r;web/d;configuration"));
    // AND the internal link never reaches the sink
    let delivered = h.sink.notifications();
    assert!(relationship_edges(&delivered, Action::Created)
        .iter()
        .all(|(_, name, _)| name != "hasData"));
}

#[test]
fn test_well_known_relationships_cannot_be_created_by_hand() {
    let mut h = setup();
    let t = path("/t;t");
    h.inventory.create(None, Blueprint::tenant("t")).unwrap();
    h.inventory
        .create(Some(&t), Blueprint::resource_type("host"))
        .unwrap();
    h.inventory
        .create(Some(&t), Blueprint::environment("prod"))
        .unwrap();

    let err = h
        .inventory
        .associate(&path("/t;t/rt;host"), Direction::Outgoing, "defines", "../e;prod")
        .unwrap_err();

    assert!(matches!(err, InventoryError::ImmutableRelationship { .. }));
}

#[test]
fn test_custom_relationship_lifecycle() {
    // GIVEN two environments
    let mut h = setup();
    let t = path("/t;t");
    let prod = path("/t;t/e;prod");
    h.inventory.create(None, Blueprint::tenant("t")).unwrap();
    h.inventory.create(Some(&t), Blueprint::environment("prod")).unwrap();
    h.inventory
        .create(
            Some(&t),
            Blueprint::environment("stage").with_outgoing("promotesTo", "e;prod"),
        )
        .unwrap();

    // THEN the blueprint's relationship exists
    let incoming = h
        .inventory
        .relationships(&prod, Direction::Incoming, &["promotesTo"])
        .unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].source, path("/t;t/e;stage"));

    // WHEN its properties are replaced and it is removed again
    let updated = h
        .inventory
        .update_relationship(&incoming[0].id, Properties::new().with("gate", json!("manual")))
        .unwrap();
    assert_eq!(updated.properties.get("gate"), Some(&json!("manual")));
    h.inventory
        .disassociate(&prod, Direction::Incoming, "promotesTo", "../e;stage")
        .unwrap();

    // THEN it is gone and removing it twice is a not-found error
    assert!(h
        .inventory
        .relationships(&prod, Direction::Incoming, &["promotesTo"])
        .unwrap()
        .is_empty());
    let err = h
        .inventory
        .disassociate(&prod, Direction::Incoming, "promotesTo", "../e;stage")
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_unresolvable_custom_reference_fails_the_create() {
    // GIVEN a tenant
    let mut h = setup();
    h.inventory.create(None, Blueprint::tenant("t")).unwrap();

    // WHEN an environment refers to one that never gets created
    let err = h
        .inventory
        .create(
            Some(&path("/t;t")),
            Blueprint::environment("stage").with_outgoing("promotesTo", "e;prod"),
        )
        .unwrap_err();

    // THEN the whole create is rolled back
    assert!(err.is_not_found());
    assert!(h.inventory.find(&path("/t;t/e;stage")).unwrap().is_none());
}
