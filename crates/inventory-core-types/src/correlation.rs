//! Correlation identifiers
//!
//! Every logical inventory operation gets a [`RequestId`]; every transaction
//! frame gets a [`FrameId`]. Both show up in the structured log stream so the
//! retries of one operation can be grouped back together.
//!
//! Ids are UUIDv7 strings, so ids minted later sort after earlier ones.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! correlation_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

correlation_id!(
    /// One logical operation, across all of its attempts
    RequestId
);

correlation_id!(
    /// A transaction frame batching several operations
    FrameId
);
