#![allow(dead_code)]

use std::sync::Arc;

use inventory_core::backend::{BackendCapabilities, MemoryBackend};
use inventory_core::model::{Action, CanonicalPath, Notification};
use inventory_engine::{Inventory, InventoryConfig, RecordingSink};

/// Store, inventory over it and the sink receiving its notifications
pub struct Harness {
    pub backend: MemoryBackend,
    pub inventory: Inventory,
    pub sink: Arc<RecordingSink>,
}

fn config() -> InventoryConfig {
    InventoryConfig::default()
        .with_retries(5)
        .with_initial_wait_ms(0)
        .with_jitter_ms(0)
}

fn harness(backend: MemoryBackend) -> Harness {
    let sink = Arc::new(RecordingSink::new());
    let inventory = Inventory::new(Arc::new(backend.clone()), config()).with_sink(sink.clone());
    Harness {
        backend,
        inventory,
        sink,
    }
}

/// Backend keeping one transaction open per frame
pub fn setup() -> Harness {
    harness(MemoryBackend::new())
}

/// Backend committing every frame operation on its own
pub fn setup_many() -> Harness {
    harness(MemoryBackend::new().with_capabilities(BackendCapabilities {
        single_transaction_frames: false,
        ..BackendCapabilities::default()
    }))
}

/// Single-transaction frames over a backend whose rolled back work stays
pub fn setup_persisting() -> Harness {
    harness(MemoryBackend::new().with_capabilities(BackendCapabilities {
        persists_intermediate_work: true,
        ..BackendCapabilities::default()
    }))
}

/// Parse a canonical path, panicking on malformed test input
pub fn path(text: &str) -> CanonicalPath {
    CanonicalPath::parse(text).unwrap()
}

/// Sorted paths of the entities `notifications` report with `action`
pub fn entity_paths(notifications: &[Notification], action: Action) -> Vec<String> {
    let mut out: Vec<_> = notifications
        .iter()
        .filter(|n| n.action == action)
        .filter_map(|n| n.entity_path().map(|p| p.to_string()))
        .collect();
    out.sort();
    out
}

/// (source, name, target) of the relationships `notifications` report with `action`
pub fn relationship_edges(
    notifications: &[Notification],
    action: Action,
) -> Vec<(String, String, String)> {
    notifications
        .iter()
        .filter(|n| n.action == action)
        .filter_map(|n| n.subject.as_relationship())
        .map(|r| (r.source.to_string(), r.name.clone(), r.target.to_string()))
        .collect()
}
