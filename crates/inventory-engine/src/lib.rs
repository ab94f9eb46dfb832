//! Inventory Engine - transactional write pipeline
//!
//! Drives the core building blocks through whole operations:
//! - [`Transaction`]: one backend transaction plus its pre-commit ledger
//! - [`RetryDriver`]: re-runs payloads on commit conflicts with backoff
//! - [`TransactionFrame`]: batches operations into one notification unit
//! - [`commands`]: create / update / delete and relationship operations
//! - [`Inventory`]: the facade tying it together with configuration and
//!   notification delivery

pub mod commands;
pub mod config;
pub mod frame;
pub mod hooks;
pub mod inventory;
pub mod notify;
pub mod retry;
pub mod transaction;

pub use config::{InventoryConfig, LoggingConfig, TransactionConfig};
pub use frame::TransactionFrame;
pub use hooks::EntityHooks;
pub use inventory::{Inventory, Mutations};
pub use notify::{NotificationSink, RecordingSink, TracingSink};
pub use retry::{Committed, RetryDriver};
pub use transaction::{Transaction, TransactionSavepoint};
