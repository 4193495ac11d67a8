//! In-memory driver.
//!
//! Keeps a model of the managed chain instead of touching the host: `flush`
//! empties it and `insert` pushes at the head, exactly like `iptables -I`.
//! Used by `plan`/dry-run deployments and throughout the test suites.

use std::net::IpAddr;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::firewall::{FirewallDriver, FirewallError, FirewallRule, RuleAction};

/// A call received by the driver, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Flush,
    Insert(FirewallRule),
}

#[derive(Debug, Default)]
pub struct DryRunDriver {
    calls: Mutex<Vec<DriverCall>>,
    /// Chain contents, first element evaluated first.
    chain: Mutex<Vec<FirewallRule>>,
    /// Calls left before the next one is rejected.
    fail_in: Mutex<Option<usize>>,
}

impl DryRunDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().clone()
    }

    /// Forgets the call log; the chain model is kept.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Rules of successful `insert` calls since the last flush, in the
    /// order they were applied.
    pub fn applied(&self) -> Vec<FirewallRule> {
        let mut applied = self.chain.lock().clone();
        applied.reverse();
        applied
    }

    /// The chain in evaluation order.
    pub fn chain(&self) -> Vec<FirewallRule> {
        self.chain.lock().clone()
    }

    /// Action of the first rule matching TCP traffic from `source` to `port`.
    pub fn verdict(&self, source: IpAddr, port: u16) -> Option<RuleAction> {
        self.chain
            .lock()
            .iter()
            .find(|rule| rule.matches(source, port))
            .map(|rule| rule.action)
    }

    /// Rejects the call made after `calls` more successful ones.
    pub fn fail_after(&self, calls: usize) {
        *self.fail_in.lock() = Some(calls);
    }

    fn check_failure(&self, what: &str) -> Result<(), FirewallError> {
        let mut pending = self.fail_in.lock();
        match *pending {
            Some(0) => {
                *pending = None;
                Err(FirewallError::Rejected(what.to_string()))
            }
            Some(left) => {
                *pending = Some(left - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FirewallDriver for DryRunDriver {
    fn name(&self) -> &'static str {
        "dry_run"
    }

    async fn flush(&self) -> Result<(), FirewallError> {
        self.check_failure("flush")?;
        self.calls.lock().push(DriverCall::Flush);
        self.chain.lock().clear();
        info!("dry-run: flush");
        Ok(())
    }

    async fn insert(&self, rule: &FirewallRule) -> Result<(), FirewallError> {
        self.check_failure(&rule.to_string())?;
        self.calls.lock().push(DriverCall::Insert(rule.clone()));
        self.chain.lock().insert(0, rule.clone());
        info!(rule = %rule, "dry-run: insert");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(raw: &str) -> IpAddr {
        raw.parse().unwrap()
    }

    #[tokio::test]
    async fn head_insertion_gives_later_rules_precedence() {
        let driver = DryRunDriver::new();
        driver.insert(&FirewallRule::reject_port("8080")).await.unwrap();
        driver
            .insert(&FirewallRule::accept_source(addr("10.0.0.5"), "8080", "alice"))
            .await
            .unwrap();

        assert_eq!(
            driver.verdict(addr("10.0.0.5"), 8080),
            Some(RuleAction::AcceptSourceOnPort)
        );
        assert_eq!(
            driver.verdict(addr("10.0.0.6"), 8080),
            Some(RuleAction::RejectAllOnPort)
        );
        assert_eq!(driver.verdict(addr("10.0.0.6"), 22), None);
    }

    #[tokio::test]
    async fn flush_empties_chain() {
        let driver = DryRunDriver::new();
        driver.insert(&FirewallRule::reject_port("8080")).await.unwrap();
        driver.flush().await.unwrap();
        assert!(driver.chain().is_empty());
        assert_eq!(driver.calls().len(), 2);
        assert_eq!(driver.calls()[1], DriverCall::Flush);
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let driver = DryRunDriver::new();
        driver.fail_after(1);
        driver.flush().await.unwrap();
        assert!(driver
            .insert(&FirewallRule::reject_port("8080"))
            .await
            .is_err());
        driver.insert(&FirewallRule::reject_port("8080")).await.unwrap();
        assert_eq!(driver.applied(), vec![FirewallRule::reject_port("8080")]);
    }
}
