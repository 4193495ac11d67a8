//! ## vakthund-core::gate
//! **Admission, probe tracking and expiry**
//!
//! Every operation mutates [`GateState`] under a short synchronous lock and
//! then runs a resync. Resyncs are serialized by an async mutex around the
//! synthesizer, and the rule plan is computed inside that critical section,
//! so a pass always applies the state as it was when the pass started and
//! the last pass to complete applies the newest state.
//!
//! A resync failure does not roll back the state change that triggered it.
//! The change is picked up by the next successful pass.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};
use vakthund_config::{GatewaySpec, ResyncMode, VakthundConfig};
use vakthund_detection::SuspectRecord;
use vakthund_prevention::{FirewallDriver, FirewallRule, ResyncReport, Synthesizer};
use vakthund_telemetry::MetricsRecorder;

use crate::error::GateError;
use crate::state::GateState;
use crate::time::{Clock, SystemClock};

/// Tunables of the gate itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSettings {
    /// Hits at which a suspect is banned from the management port.
    pub ban_threshold: u32,
    /// Suspect age, from first sighting, after which the sweep forgets it.
    pub retention: Duration,
    pub resync_mode: ResyncMode,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            ban_threshold: 5,
            retention: Duration::from_secs(3_600),
            resync_mode: ResyncMode::Rebuild,
        }
    }
}

impl From<&VakthundConfig> for GateSettings {
    fn from(config: &VakthundConfig) -> Self {
        Self {
            ban_threshold: config.suspects.ban_threshold,
            retention: Duration::from_secs(config.suspects.retention_secs),
            resync_mode: config.firewall.resync_mode,
        }
    }
}

/// Result of a successful admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The route was already bound to the requester; nothing changed.
    AlreadyBound,
    /// The route now points at the requester.
    Bound { previous: Option<IpAddr> },
}

pub struct Gate {
    state: Mutex<GateState>,
    synthesizer: tokio::sync::Mutex<Synthesizer>,
    clock: Arc<dyn Clock>,
    metrics: MetricsRecorder,
    settings: GateSettings,
}

impl Gate {
    pub fn new(
        spec: GatewaySpec,
        driver: Arc<dyn FirewallDriver>,
        settings: GateSettings,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            state: Mutex::new(GateState::new(spec)),
            synthesizer: tokio::sync::Mutex::new(Synthesizer::new(driver, settings.resync_mode)),
            clock: Arc::new(SystemClock),
            metrics,
            settings,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> GateSettings {
        self.settings
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Binds route `/{port}/{path}` to `source` and resyncs.
    ///
    /// A request from the address the route is already bound to changes
    /// nothing and does not touch the firewall. Otherwise the binding is
    /// overwritten unconditionally (last writer wins).
    #[instrument(level = "debug", skip(self))]
    pub async fn admit(&self, port: &str, path: &str, source: IpAddr) -> Result<Admission, GateError> {
        let previous = {
            let mut state = self.state.lock();
            let route = state
                .spec
                .route_mut(port, path)
                .ok_or_else(|| GateError::UnknownRoute {
                    port: port.to_string(),
                    path: path.to_string(),
                })?;
            if route.bound == Some(source) {
                debug!(label = %route.label, "route already bound to requester");
                return Ok(Admission::AlreadyBound);
            }
            let previous = route.bound.replace(source);
            info!(
                port,
                label = %route.label,
                previous = ?previous,
                "route bound"
            );
            previous
        };

        self.metrics.admissions.inc();
        self.resync().await?;
        Ok(Admission::Bound { previous })
    }

    /// Counts one unmatched request from `source` and resyncs.
    #[instrument(level = "debug", skip(self))]
    pub async fn record_probe(&self, source: IpAddr) -> Result<SuspectRecord, GateError> {
        let now = self.clock.now();
        let record = {
            let mut state = self.state.lock();
            let record = state.suspects.record_hit(source, now);
            if record.count == self.settings.ban_threshold {
                warn!(count = record.count, "suspect reached ban threshold");
            }
            self.update_suspect_gauges(&state);
            record
        };

        self.metrics.probes.inc();
        self.resync().await?;
        Ok(record)
    }

    /// Drops suspects older than the retention window, then resyncs even if
    /// nothing was dropped. Returns the forgotten sources.
    #[instrument(level = "debug", skip(self))]
    pub async fn sweep(&self) -> Result<Vec<IpAddr>, GateError> {
        let now = self.clock.now();
        let retention = chrono::Duration::from_std(self.settings.retention)
            .unwrap_or(chrono::Duration::MAX);
        let expired = {
            let mut state = self.state.lock();
            let expired = state.suspects.expire(now, retention);
            self.update_suspect_gauges(&state);
            expired
        };
        if !expired.is_empty() {
            info!(expired = expired.len(), "suspects expired");
        }

        self.resync().await?;
        Ok(expired)
    }

    /// Re-derives the full rule set from current state and applies it.
    pub async fn resync(&self) -> Result<ResyncReport, GateError> {
        let mut synthesizer = self.synthesizer.lock().await;
        let rules = self.plan();
        match synthesizer.apply(rules).await {
            Ok(report) => {
                self.metrics.record_resync(
                    report.rules,
                    report.skipped,
                    report.elapsed.as_secs_f64(),
                );
                Ok(report)
            }
            Err(err) => {
                self.metrics.resync_failures.inc();
                warn!(error = %err, "resync aborted");
                Err(err.into())
            }
        }
    }

    /// Rule set derivable from the current state.
    pub fn plan(&self) -> Vec<FirewallRule> {
        self.state.lock().plan(self.settings.ban_threshold)
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> GateState {
        self.state.lock().clone()
    }

    fn update_suspect_gauges(&self, state: &GateState) {
        self.metrics.set_suspects(
            state.suspects.len(),
            state.banned_count(self.settings.ban_threshold),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::VirtualClock;
    use chrono::{TimeZone, Utc};
    use tracing_test::traced_test;
    use vakthund_config::{AccessRoute, ProtectedService};
    use vakthund_prevention::{DriverCall, DryRunDriver, RuleAction};

    fn addr(raw: &str) -> IpAddr {
        raw.parse().unwrap()
    }

    fn spec() -> GatewaySpec {
        GatewaySpec {
            management_port: "9090".into(),
            services: vec![ProtectedService {
                port: "8080".into(),
                routes: vec![
                    AccessRoute {
                        path: "secret1".into(),
                        label: "alice".into(),
                        bound: None,
                    },
                    AccessRoute {
                        path: "secret2".into(),
                        label: "bob".into(),
                        bound: None,
                    },
                ],
            }],
        }
    }

    struct Fixture {
        gate: Gate,
        driver: Arc<DryRunDriver>,
        clock: VirtualClock,
    }

    fn fixture(settings: GateSettings) -> Fixture {
        let driver = Arc::new(DryRunDriver::new());
        let clock = VirtualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let gate = Gate::new(
            spec(),
            driver.clone(),
            settings,
            MetricsRecorder::new().unwrap(),
        )
        .with_clock(Arc::new(clock.clone()));
        Fixture {
            gate,
            driver,
            clock,
        }
    }

    fn accepts(driver: &DryRunDriver) -> Vec<FirewallRule> {
        driver
            .applied()
            .into_iter()
            .filter(|rule| rule.action == RuleAction::AcceptSourceOnPort)
            .collect()
    }

    fn bans(driver: &DryRunDriver) -> Vec<FirewallRule> {
        driver
            .applied()
            .into_iter()
            .filter(|rule| rule.action == RuleAction::RejectSourceOnPort)
            .collect()
    }

    #[tokio::test]
    async fn first_touch_binds_and_resyncs() {
        let f = fixture(GateSettings::default());
        let admission = f.gate.admit("8080", "secret1", addr("10.0.0.5")).await.unwrap();
        assert_eq!(admission, Admission::Bound { previous: None });
        assert_eq!(
            accepts(&f.driver),
            vec![FirewallRule::accept_source(addr("10.0.0.5"), "8080", "alice")]
        );
        assert_eq!(
            f.driver.verdict(addr("10.0.0.5"), 8080),
            Some(RuleAction::AcceptSourceOnPort)
        );
    }

    #[tokio::test]
    async fn repeated_admission_is_a_no_op() {
        let f = fixture(GateSettings::default());
        f.gate.admit("8080", "secret1", addr("10.0.0.5")).await.unwrap();
        f.driver.clear_calls();

        let admission = f.gate.admit("8080", "secret1", addr("10.0.0.5")).await.unwrap();
        assert_eq!(admission, Admission::AlreadyBound);
        assert!(f.driver.calls().is_empty());
        assert_eq!(f.gate.metrics().admissions.get(), 1);
    }

    #[tokio::test]
    async fn rebinding_replaces_accept() {
        let f = fixture(GateSettings::default());
        f.gate.admit("8080", "secret1", addr("10.0.0.5")).await.unwrap();
        let admission = f.gate.admit("8080", "secret1", addr("10.0.0.6")).await.unwrap();
        assert_eq!(
            admission,
            Admission::Bound {
                previous: Some(addr("10.0.0.5"))
            }
        );
        assert_eq!(
            accepts(&f.driver),
            vec![FirewallRule::accept_source(addr("10.0.0.6"), "8080", "alice")]
        );
        assert_eq!(
            f.driver.verdict(addr("10.0.0.5"), 8080),
            Some(RuleAction::RejectAllOnPort)
        );
    }

    #[tokio::test]
    async fn unknown_route_leaves_state_alone() {
        let f = fixture(GateSettings::default());
        let err = f.gate.admit("8080", "nope", addr("10.0.0.5")).await.unwrap_err();
        assert!(matches!(err, GateError::UnknownRoute { .. }));
        let err = f.gate.admit("22", "secret1", addr("10.0.0.5")).await.unwrap_err();
        assert!(matches!(err, GateError::UnknownRoute { .. }));
        assert!(f.driver.calls().is_empty());
        assert_eq!(f.gate.snapshot().spec, spec());
    }

    #[tokio::test]
    async fn ban_appears_at_threshold() {
        let f = fixture(GateSettings::default());
        for hit in 1..=4u32 {
            let record = f.gate.record_probe(addr("10.0.0.9")).await.unwrap();
            assert_eq!(record.count, hit);
            assert!(bans(&f.driver).is_empty());
        }
        f.gate.record_probe(addr("10.0.0.9")).await.unwrap();
        assert_eq!(
            bans(&f.driver),
            vec![FirewallRule::reject_source(addr("10.0.0.9"), "9090")]
        );

        // further probes keep the single ban
        f.gate.record_probe(addr("10.0.0.9")).await.unwrap();
        assert_eq!(bans(&f.driver).len(), 1);
        assert_eq!(f.gate.metrics().banned_sources.get(), 1);
        assert_eq!(f.gate.metrics().probes.get(), 6);
    }

    #[tokio::test]
    async fn every_probe_resyncs() {
        let f = fixture(GateSettings::default());
        f.gate.record_probe(addr("10.0.0.9")).await.unwrap();
        f.gate.record_probe(addr("10.0.0.9")).await.unwrap();
        let flushes = f
            .driver
            .calls()
            .iter()
            .filter(|call| **call == DriverCall::Flush)
            .count();
        assert_eq!(flushes, 2);
    }

    #[tokio::test]
    async fn sweep_expires_by_first_seen() {
        let f = fixture(GateSettings::default());
        for _ in 0..5 {
            f.gate.record_probe(addr("10.0.0.9")).await.unwrap();
        }
        // keep probing right up to the deadline
        f.clock.advance(Duration::from_secs(59 * 60));
        f.gate.record_probe(addr("10.0.0.9")).await.unwrap();

        f.clock.advance(Duration::from_secs(60));
        assert!(f.gate.sweep().await.unwrap().is_empty());
        assert_eq!(bans(&f.driver).len(), 1);

        f.clock.advance(Duration::from_secs(1));
        let expired = f.gate.sweep().await.unwrap();
        assert_eq!(expired, vec![addr("10.0.0.9")]);
        assert!(bans(&f.driver).is_empty());
        assert!(f.gate.snapshot().suspects.is_empty());
        assert_eq!(f.gate.metrics().suspects.get(), 0);
    }

    #[tokio::test]
    async fn sweep_resyncs_when_nothing_expired() {
        let f = fixture(GateSettings::default());
        f.gate.sweep().await.unwrap();
        assert_eq!(f.driver.calls()[0], DriverCall::Flush);
    }

    #[tokio::test]
    async fn consecutive_resyncs_are_identical() {
        let f = fixture(GateSettings::default());
        f.gate.admit("8080", "secret2", addr("10.0.0.7")).await.unwrap();
        for _ in 0..5 {
            f.gate.record_probe(addr("10.0.0.9")).await.unwrap();
        }

        f.driver.clear_calls();
        f.gate.resync().await.unwrap();
        let first = f.driver.calls();
        f.driver.clear_calls();
        f.gate.resync().await.unwrap();
        assert_eq!(f.driver.calls(), first);
        assert_eq!(first.len(), 1 + f.gate.plan().len());
    }

    #[tokio::test]
    async fn skip_unchanged_mode_elides_identical_passes() {
        let f = fixture(GateSettings {
            resync_mode: ResyncMode::SkipUnchanged,
            ..GateSettings::default()
        });
        f.gate.record_probe(addr("10.0.0.9")).await.unwrap();
        f.driver.clear_calls();

        // second probe leaves the plan unchanged (still under threshold)
        f.gate.record_probe(addr("10.0.0.9")).await.unwrap();
        assert!(f.driver.calls().is_empty());
        assert_eq!(f.gate.metrics().resyncs.get(), 2);
    }

    #[traced_test]
    #[tokio::test]
    async fn failed_resync_keeps_binding() {
        let f = fixture(GateSettings::default());
        f.driver.fail_after(0);
        let err = f.gate.admit("8080", "secret1", addr("10.0.0.5")).await.unwrap_err();
        assert!(matches!(err, GateError::Firewall(_)));
        assert!(logs_contain("resync aborted"));
        assert_eq!(f.gate.metrics().resync_failures.get(), 1);

        let state = f.gate.snapshot();
        assert_eq!(
            state.spec.route("8080", "secret1").unwrap().bound,
            Some(addr("10.0.0.5"))
        );

        // next successful pass materializes it
        f.gate.resync().await.unwrap();
        assert_eq!(accepts(&f.driver).len(), 1);
    }

    #[tokio::test]
    async fn custom_threshold() {
        let f = fixture(GateSettings {
            ban_threshold: 2,
            ..GateSettings::default()
        });
        f.gate.record_probe(addr("10.0.0.9")).await.unwrap();
        f.gate.record_probe(addr("10.0.0.9")).await.unwrap();
        assert_eq!(bans(&f.driver).len(), 1);
    }

    #[tokio::test]
    async fn concurrent_requests_converge() {
        let f = fixture(GateSettings::default());
        let gate = Arc::new(f.gate);
        let mut tasks = Vec::new();
        for host in 1..=20u8 {
            let gate = gate.clone();
            tasks.push(tokio::spawn(async move {
                gate.record_probe(IpAddr::from([10, 0, 1, host])).await
            }));
        }
        let admit = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.admit("8080", "secret1", addr("10.0.0.5")).await })
        };
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        admit.await.unwrap().unwrap();

        // whichever pass ran last saw every mutation
        assert_eq!(f.driver.applied(), gate.plan());
        assert_eq!(gate.snapshot().suspects.len(), 20);
    }

    #[tokio::test]
    async fn ipv6_prober_does_not_block_resyncs() {
        // `true` stands in for iptables; no ip6tables is configured
        let gate = Gate::new(
            spec(),
            Arc::new(vakthund_prevention::IptablesDriver::new("true")),
            GateSettings::default(),
            MetricsRecorder::new().unwrap(),
        );
        for _ in 0..5 {
            gate.record_probe(addr("2001:db8::1")).await.unwrap();
        }
        assert_eq!(gate.snapshot().suspects.get(&addr("2001:db8::1")).unwrap().count, 5);

        gate.admit("8080", "secret1", addr("10.0.0.5")).await.unwrap();
        gate.sweep().await.unwrap();
        assert_eq!(gate.metrics().resync_failures.get(), 0);
    }
}
