//! Relationship rule engine
//!
//! Every creation or deletion of a relationship requested through the public
//! association surface is checked here before the backend is touched. The
//! rules are a static table from relationship name to an ordered list of
//! checks; the first failing check wins.

pub mod relationship_rules;

pub use relationship_rules::{check_create, check_delete};
