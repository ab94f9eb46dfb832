//! Pre-commit ledger
//!
//! Collects what a transaction changed and turns it into consistent
//! identity hashes and a final notification list right before commit.

pub mod pre_commit;
pub mod processing_tree;

pub use pre_commit::{LedgerMark, LedgerState, PreCommitAction, PreCommitLedger};
pub use processing_tree::{Node, NodeId, ProcessingTree};
