//! Inventory Core - graph model and pre-commit machinery
//!
//! This crate provides the building blocks of the inventory write pipeline:
//! - Canonical paths, entity kinds and their containment grammar
//! - Entities, blueprints, relationships and change notifications
//! - The backend contract and an in-memory reference backend
//! - The relationship rule engine
//! - Identity hashing of containment subtrees
//! - The processing tree and pre-commit ledger that repair hashes and
//!   produce the final notification list of a transaction

pub mod backend;
pub mod errors;
pub mod hash;
pub mod ledger;
pub mod logging_facility;
pub mod model;
pub mod rules;

// Re-export commonly used types
pub use backend::{Backend, BackendCapabilities, BackendProvider, MemoryBackend, Page, Pager, Query};
pub use errors::{ExError, ExErrorKind, InventoryError, Result};
pub use ledger::{PreCommitAction, PreCommitLedger};
pub use model::{
    Action, ActionContext, Blueprint, CanonicalPath, Definition, Direction, Entity, EntityChange,
    EntityKind, EntityUpdate, MetricDataType, Notification, PathRef, Properties, Relationship,
    Subject, WellKnown,
};
