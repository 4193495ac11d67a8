//! ## vakthund-telemetry::logging
//! **Subscriber setup for the `vakthund` binary**
//!
//! `RUST_LOG` wins when it is set and parses; otherwise the configured
//! `telemetry.log_level` is used, and `info` when that is invalid too.

use tracing_subscriber::{fmt, EnvFilter};

/// Error returned when a global subscriber is already installed.
pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

const FALLBACK_FILTER: &str = "info";

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global fmt subscriber.
    pub fn init(default_filter: &str) -> Result<(), InitError> {
        let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
        fmt()
            .with_env_filter(Self::filter(env.as_deref(), default_filter))
            .with_target(true)
            .with_thread_names(true)
            .try_init()
    }

    /// Picks the filter from the environment directive, then the configured
    /// default, then `info`.
    pub fn filter(env: Option<&str>, default_filter: &str) -> EnvFilter {
        env.and_then(|directive| EnvFilter::try_new(directive).ok())
            .or_else(|| EnvFilter::try_new(default_filter).ok())
            .unwrap_or_else(|| EnvFilter::new(FALLBACK_FILTER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_directive_wins() {
        let filter = EventLogger::filter(Some("vakthund_core=trace"), "warn");
        assert_eq!(filter.to_string(), "vakthund_core=trace");
    }

    #[test]
    fn configured_default_used_without_env() {
        let filter = EventLogger::filter(None, "debug");
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn invalid_directives_fall_back() {
        let filter = EventLogger::filter(Some("vakthund=loud"), "other=quiet");
        assert_eq!(filter.to_string(), "info");
    }
}
