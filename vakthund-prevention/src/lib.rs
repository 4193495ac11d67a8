//! # Vakthund Prevention Modules
//!
//! Turns the gate's state into host firewall rules.
//!
//! - `firewall`: rule model, driver trait and driver errors
//! - `iptables`: driver that shells out to `iptables`/`ip6tables`
//! - `dry_run`: driver that records rules in memory and logs them
//! - `synthesizer`: rule planning and serialized application

pub mod dry_run;
pub mod firewall;
pub mod iptables;
pub mod synthesizer;

pub use dry_run::{DriverCall, DryRunDriver};
pub use firewall::{FirewallDriver, FirewallError, FirewallRule, RuleAction};
pub use iptables::IptablesDriver;
pub use synthesizer::{plan, ResyncReport, Synthesizer};
