//! Suspect tracking configuration.
//!
//! Thresholds for banning sources that probe undeclared paths, and the
//! expiry sweep that eventually forgets them.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// What the sweeper does when its resync fails.
#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SweepFailurePolicy {
    /// Stop the process with a non-zero status.
    #[default]
    Exit,
    /// Log the failure and keep the previously applied rules.
    Continue,
}

/// Suspect tracking parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct SuspectConfig {
    /// Unmatched-path hits after which a source is banned from the
    /// management port.
    #[validate(range(min = 1, max = 1_000_000))]
    #[serde(default = "default_ban_threshold")]
    pub ban_threshold: u32,

    /// Period of the expiry sweep (seconds).
    #[validate(range(min = 1, max = 86_400))]
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Age, measured from first sighting, after which a suspect is dropped
    /// (seconds).
    #[validate(range(min = 1, max = 2_592_000))]
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    #[serde(default)]
    pub on_sweep_failure: SweepFailurePolicy,
}

fn default_ban_threshold() -> u32 {
    5
}
fn default_sweep_interval() -> u64 {
    600
}
fn default_retention() -> u64 {
    3_600
}

impl Default for SuspectConfig {
    fn default() -> Self {
        Self {
            ban_threshold: default_ban_threshold(),
            sweep_interval_secs: default_sweep_interval(),
            retention_secs: default_retention(),
            on_sweep_failure: SweepFailurePolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_default_suspect_config() {
        let config = SuspectConfig::default();
        config.validate().expect("Default config should be valid");
        assert_eq!(config.ban_threshold, 5);
        assert_eq!(config.sweep_interval_secs, 600);
        assert_eq!(config.retention_secs, 3_600);
        assert_eq!(config.on_sweep_failure, SweepFailurePolicy::Exit);
    }

    #[test]
    fn invalid_threshold() {
        let mut config = SuspectConfig::default();
        config.ban_threshold = 0;
        assert!(config.validate().is_err());
    }
}
