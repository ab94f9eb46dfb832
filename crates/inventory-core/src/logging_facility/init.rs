//! Logging initialization
//!
//! One process-wide subscriber, installed on first call.

use std::sync::Once;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

/// Logging profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable output, `inventory=debug`
    Development,
    /// JSON output, `inventory=info`
    Production,
    /// Bare registry; use `init_test_capture()` to record events
    Test,
}

impl Profile {
    /// Filter used when neither `RUST_LOG` nor an explicit filter is set
    pub fn default_filter(&self) -> &'static str {
        match self {
            Profile::Development => "inventory=debug",
            Profile::Production => "inventory=info",
            Profile::Test => "off",
        }
    }
}

static INIT_ONCE: Once = Once::new();

/// Initialize the logging facility with the profile's default filter
///
/// `RUST_LOG` takes precedence when set. Later calls are no-ops.
///
/// ```
/// use inventory_core::logging_facility::{init, Profile};
///
/// init(Profile::Development);
/// ```
pub fn init(profile: Profile) {
    init_with_filter(profile, None);
}

/// Initialize the logging facility with an explicit filter directive
///
/// The directive is used when `RUST_LOG` is unset; an unparsable directive
/// falls back to the profile default.
pub fn init_with_filter(profile: Profile, filter: Option<&str>) {
    INIT_ONCE.call_once(|| {
        let directive = filter.unwrap_or(profile.default_filter());
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(directive))
            .unwrap_or_else(|_| EnvFilter::new(profile.default_filter()));

        match profile {
            Profile::Development => {
                tracing_subscriber::fmt().with_env_filter(env_filter).init();
            }
            Profile::Production => {
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(env_filter)
                    .init();
            }
            Profile::Test => {
                tracing_subscriber::registry().init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filters_target_the_inventory_crates() {
        assert_eq!(Profile::Development.default_filter(), "inventory=debug");
        assert_eq!(Profile::Production.default_filter(), "inventory=info");
    }

    #[test]
    fn test_init_idempotent() {
        init(Profile::Test);
        init_with_filter(Profile::Test, Some("inventory=trace"));
    }
}
