//! Core types shared across the inventory crates
//!
//! This crate provides the small set of types used by both the error and
//! logging facilities of the core and the engine:
//!
//! - **Correlation types**: RequestId, FrameId
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;

pub use correlation::{FrameId, RequestId};
