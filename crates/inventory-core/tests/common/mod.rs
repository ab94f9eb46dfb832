#![allow(dead_code)]

use inventory_core::backend::{Backend, BackendProvider, MemoryBackend};
use inventory_core::model::{
    Action, CanonicalPath, Definition, Entity, EntityChange, MetricDataType, Notification,
    Properties,
};
use inventory_core::PreCommitLedger;

/// Parse a canonical path, panicking on malformed test input
pub fn path(text: &str) -> CanonicalPath {
    CanonicalPath::parse(text).unwrap()
}

pub fn plain(text: &str) -> Entity {
    Entity::new(path(text), Definition::Plain)
}

pub fn resource(text: &str, resource_type: &str) -> Entity {
    Entity::new(
        path(text),
        Definition::Resource {
            resource_type: path(resource_type),
        },
    )
}

pub fn metric_type(text: &str, unit: &str) -> Entity {
    Entity::new(
        path(text),
        Definition::MetricType {
            unit: unit.to_string(),
            data_type: MetricDataType::Gauge,
            collection_interval: None,
        },
    )
}

pub fn data(text: &str, value: serde_json::Value) -> Entity {
    Entity::new(path(text), Definition::Data { value })
}

/// Persist `entities` (parents first), each with a `contains` edge from its
/// parent when the parent is part of the batch or already stored
pub fn persist_tree(tx: &mut dyn Backend, entities: Vec<Entity>) {
    for entity in entities {
        let child = entity.path.clone();
        tx.persist(entity).unwrap();
        if let Some(parent) = child.parent() {
            if tx.find(&parent).unwrap().is_some() {
                tx.relate(&parent, &child, "contains", Properties::new())
                    .unwrap();
            }
        }
    }
}

/// Persist `entities`, give them their first identity hashes and commit
pub fn seed(backend: &MemoryBackend, entities: Vec<Entity>) -> Vec<Notification> {
    let mut tx = backend.start_transaction(true).unwrap();
    let mut ledger = PreCommitLedger::new();
    for entity in &entities {
        ledger.add_notifications(
            EntityChange::new(entity.clone())
                .with(Notification::entity(Action::Created, entity.clone())),
        );
    }
    persist_tree(tx.as_mut(), entities);
    ledger.process(tx.as_mut()).unwrap();
    tx.commit().unwrap();
    ledger.final_notifications().unwrap()
}

/// Committed identity hash of the entity at `text`
pub fn stored_hash(backend: &MemoryBackend, text: &str) -> Option<String> {
    let tx = backend.start_transaction(false).unwrap();
    tx.get(&path(text)).unwrap().identity_hash
}
