//! Identity hashing
//!
//! Identity hashes are SHA-256 digests over canonical JSON (object keys
//! sorted, no whitespace). They cover an entity's kind, its defining fields
//! and the ordered `(segment, hash)` pairs of its contained children. The
//! entity's own id is not covered, so equal subtrees hash equally wherever
//! they live.

pub mod identity;

pub use identity::{compute_hash, IdentityHashTree};
