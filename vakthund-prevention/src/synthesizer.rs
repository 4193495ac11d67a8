//! ## vakthund-prevention::synthesizer
//! **Full rule-set derivation and application**
//!
//! ### Ordering:
//! Rules are head-inserted, so within one pass a later rule wins over an
//! earlier one. For each service the default reject goes in first and its
//! accepts after it; management-port bans go in last so they override
//! everything on that port.
//!
//! ### Failure:
//! A driver error aborts the pass. Rules inserted before the error stay in
//! place until the next successful pass.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, instrument};
use vakthund_config::{GatewaySpec, ResyncMode};

use crate::firewall::{FirewallDriver, FirewallError, FirewallRule};

/// Derives the complete ordered rule set for `spec` plus the banned sources.
pub fn plan(spec: &GatewaySpec, banned: impl IntoIterator<Item = IpAddr>) -> Vec<FirewallRule> {
    let mut rules = Vec::new();
    for service in &spec.services {
        rules.push(FirewallRule::reject_port(&service.port));
        for route in &service.routes {
            if let Some(source) = route.bound {
                rules.push(FirewallRule::accept_source(
                    source,
                    &service.port,
                    &route.label,
                ));
            }
        }
    }
    rules.extend(
        banned
            .into_iter()
            .map(|source| FirewallRule::reject_source(source, &spec.management_port)),
    );
    rules
}

/// Outcome of one successful pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResyncReport {
    /// Rules in the plan.
    pub rules: usize,
    /// True when the driver was not called because nothing changed.
    pub skipped: bool,
    pub elapsed: Duration,
}

/// Applies plans through a driver. Not synchronized: callers serialize
/// passes (the gate keeps it behind an async mutex).
pub struct Synthesizer {
    driver: Arc<dyn FirewallDriver>,
    mode: ResyncMode,
    /// Last plan applied in full; `None` after a failed pass.
    applied: Option<Vec<FirewallRule>>,
}

impl Synthesizer {
    pub fn new(driver: Arc<dyn FirewallDriver>, mode: ResyncMode) -> Self {
        Self {
            driver,
            mode,
            applied: None,
        }
    }

    pub fn applied(&self) -> Option<&[FirewallRule]> {
        self.applied.as_deref()
    }

    /// Flushes the managed chain and inserts `rules` in order.
    #[instrument(level = "debug", skip_all, fields(driver = self.driver.name(), rules = rules.len()))]
    pub async fn apply(&mut self, rules: Vec<FirewallRule>) -> Result<ResyncReport, FirewallError> {
        let started = Instant::now();
        if self.mode == ResyncMode::SkipUnchanged && self.applied.as_ref() == Some(&rules) {
            debug!("plan unchanged, skipping driver");
            return Ok(ResyncReport {
                rules: rules.len(),
                skipped: true,
                elapsed: started.elapsed(),
            });
        }

        self.applied = None;
        self.driver.flush().await?;
        for rule in &rules {
            self.driver.insert(rule).await?;
            debug!(rule = %rule, "rule inserted");
        }

        let report = ResyncReport {
            rules: rules.len(),
            skipped: false,
            elapsed: started.elapsed(),
        };
        info!(
            rules = report.rules,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "firewall resynced"
        );
        self.applied = Some(rules);
        Ok(report)
    }
}
