//! ## vakthund-prevention::firewall
//! **Rule model and driver seam**
//!
//! A [`FirewallRule`] is one head-inserted packet-filter entry. Drivers
//! receive rules one at a time, in plan order, after a flush of the managed
//! chain; the last inserted rule is evaluated first by the kernel.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FirewallError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("driver rejected rule: {0}")]
    Rejected(String),
}

/// What a rule does with matching TCP traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Reset every connection to the port.
    RejectAllOnPort,
    /// Let one source through to the port.
    AcceptSourceOnPort,
    /// Reject one source on the port.
    RejectSourceOnPort,
}

/// One packet-filter entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FirewallRule {
    pub action: RuleAction,
    /// Destination port or `first:last` range.
    pub port: String,
    pub source: Option<IpAddr>,
    /// Annotation stored alongside the rule (the route label).
    pub comment: Option<String>,
}

impl FirewallRule {
    pub fn reject_port(port: impl Into<String>) -> Self {
        Self {
            action: RuleAction::RejectAllOnPort,
            port: port.into(),
            source: None,
            comment: None,
        }
    }

    pub fn accept_source(
        source: IpAddr,
        port: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            action: RuleAction::AcceptSourceOnPort,
            port: port.into(),
            source: Some(source),
            comment: Some(comment.into()),
        }
    }

    pub fn reject_source(source: IpAddr, port: impl Into<String>) -> Self {
        Self {
            action: RuleAction::RejectSourceOnPort,
            port: port.into(),
            source: Some(source),
            comment: None,
        }
    }

    /// Whether TCP traffic from `source` to `port` hits this rule.
    pub fn matches(&self, source: IpAddr, port: u16) -> bool {
        if self.source.is_some_and(|own| own != source) {
            return false;
        }
        let (first, last) = match self.port.split_once(':') {
            Some((first, last)) => (first.parse::<u16>(), last.parse::<u16>()),
            None => (self.port.parse::<u16>(), self.port.parse::<u16>()),
        };
        match (first, last) {
            (Ok(first), Ok(last)) => (first..=last).contains(&port),
            _ => false,
        }
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.action, self.source) {
            (RuleAction::RejectAllOnPort, _) | (_, None) => {
                write!(f, "reject * -> tcp/{}", self.port)
            }
            (RuleAction::AcceptSourceOnPort, Some(source)) => {
                write!(f, "accept {} -> tcp/{}", source, self.port)?;
                if let Some(comment) = &self.comment {
                    write!(f, " ({})", comment)?;
                }
                Ok(())
            }
            (RuleAction::RejectSourceOnPort, Some(source)) => {
                write!(f, "reject {} -> tcp/{}", source, self.port)
            }
        }
    }
}

/// Applies rules to the host packet filter.
///
/// Calls are made sequentially by a single synthesizer; implementations do
/// not need to handle concurrent use of `flush` and `insert`.
#[async_trait]
pub trait FirewallDriver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Removes every rule previously inserted by the gate.
    async fn flush(&self) -> Result<(), FirewallError>;

    /// Inserts `rule` at the head of the managed chain.
    async fn insert(&self, rule: &FirewallRule) -> Result<(), FirewallError>;
}
