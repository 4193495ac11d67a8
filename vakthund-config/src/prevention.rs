//! Prevention system configuration.
//!
//! Parameters for the firewall driver that materializes the gate's rules:
//! - Driver selection (`iptables` or a host-neutral dry run)
//! - Command invocation (binary, chain, privilege escalation, timeout)
//! - Resync strategy

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Which firewall driver applies synthesized rules.
#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// Spawn `iptables` (and optionally `ip6tables`) once per rule.
    #[default]
    Iptables,
    /// Record and log rules without touching the host.
    DryRun,
}

/// How a resync pass talks to the driver.
#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResyncMode {
    /// Flush and re-insert every rule on every pass.
    #[default]
    Rebuild,
    /// Skip the driver when the plan equals the last applied one.
    SkipUnchanged,
}

/// Firewall driver configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct FirewallConfig {
    #[serde(default)]
    pub driver: DriverKind,

    /// IPv4 command.
    #[validate(length(min = 1))]
    #[serde(default = "default_binary")]
    pub binary: String,

    /// IPv6 command. IPv6 sources are rejected by the driver when unset.
    #[serde(default)]
    pub ip6_binary: Option<String>,

    /// Chain that receives the gate's rules; flushed on every rebuild.
    #[validate(custom(function = validation::validate_chain))]
    #[serde(default = "default_chain")]
    pub chain: String,

    /// Prefix commands with `sudo`.
    #[serde(default = "default_true")]
    pub sudo: bool,

    /// Upper bound for a single driver call (milliseconds).
    #[validate(range(min = 100, max = 120_000))]
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub resync_mode: ResyncMode,

    /// Apply the configured bindings before serving requests.
    #[serde(default = "default_true")]
    pub resync_on_startup: bool,
}

fn default_binary() -> String {
    "iptables".into()
}
fn default_chain() -> String {
    "INPUT".into()
}
fn default_true() -> bool {
    true
}
fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::default(),
            binary: default_binary(),
            ip6_binary: None,
            chain: default_chain(),
            sudo: default_true(),
            timeout_ms: default_timeout_ms(),
            resync_mode: ResyncMode::default(),
            resync_on_startup: default_true(),
        }
    }
}
