//! Inventory configuration
//!
//! Every field has a default, so an empty document is a valid configuration.
//!
//! ```toml
//! [transaction]
//! retries = 10          # retries after the first attempt
//! initial_wait_ms = 300 # first backoff, doubled on each further retry
//! jitter_ms = 150       # uniform random extra wait added to each backoff
//!
//! [logging]
//! filter = "inventory=debug"
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use inventory_core::errors::{InventoryError, Result};
use inventory_core::logging_facility::{init_with_filter, Profile};

/// Retry and backoff settings of the transaction layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    pub retries: u32,
    pub initial_wait_ms: u64,
    pub jitter_ms: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            retries: 10,
            initial_wait_ms: 300,
            jitter_ms: 150,
        }
    }
}

impl TransactionConfig {
    /// No waiting between attempts
    pub fn without_backoff(mut self) -> Self {
        self.initial_wait_ms = 0;
        self.jitter_ms = 0;
        self
    }

    /// Wait before retry number `retry` (0-based)
    ///
    /// `initial_wait_ms * 2^retry` plus a fresh uniform jitter in
    /// `0..=jitter_ms`, saturating instead of overflowing.
    pub fn backoff(&self, retry: u32) -> Duration {
        let base = self
            .initial_wait_ms
            .saturating_mul(2u64.saturating_pow(retry));
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        Duration::from_millis(base.saturating_add(jitter))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub filter: Option<String>,
}

impl LoggingConfig {
    /// Install the global subscriber for `profile`
    ///
    /// `RUST_LOG` still wins over the configured filter.
    pub fn init(&self, profile: Profile) {
        init_with_filter(profile, self.filter.as_deref());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub transaction: TransactionConfig,
    pub logging: LoggingConfig,
}

impl InventoryConfig {
    /// # Errors
    ///
    /// Returns `Config` if the document is not valid TOML for this shape.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| InventoryError::Config {
            message: e.to_string(),
        })
    }

    /// # Errors
    ///
    /// Returns `Config` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| InventoryError::Config {
            message: format!("failed to read '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&text)
    }

    /// # Errors
    ///
    /// Returns `Config` if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| InventoryError::Config {
            message: e.to_string(),
        })
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.transaction.retries = retries;
        self
    }

    pub fn with_initial_wait_ms(mut self, initial_wait_ms: u64) -> Self {
        self.transaction.initial_wait_ms = initial_wait_ms;
        self
    }

    pub fn with_jitter_ms(mut self, jitter_ms: u64) -> Self {
        self.transaction.jitter_ms = jitter_ms;
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.logging.filter = Some(filter.into());
        self
    }
}
