//! ## vakthund-telemetry::metrics
//! **Prometheus registry for the gate**
//!
//! Counters track requests and resync passes, gauges mirror the suspect
//! table after every state change, and resync latency is a histogram.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub admissions: IntCounter,
    pub probes: IntCounter,
    pub resyncs: IntCounter,
    pub resync_failures: IntCounter,
    pub rules_applied: IntCounter,
    pub suspects: IntGauge,
    pub banned_sources: IntGauge,
    pub resync_latency: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let admissions = IntCounter::new(
            "vakthund_admissions_total",
            "Route bindings created or changed",
        )?;
        let probes = IntCounter::new(
            "vakthund_probes_total",
            "Requests to undeclared paths",
        )?;
        let resyncs = IntCounter::new("vakthund_resyncs_total", "Completed resync passes")?;
        let resync_failures = IntCounter::new(
            "vakthund_resync_failures_total",
            "Resync passes aborted by a driver error",
        )?;
        let rules_applied = IntCounter::new(
            "vakthund_rules_applied_total",
            "Rules inserted through the firewall driver",
        )?;
        let suspects = IntGauge::new("vakthund_suspects", "Tracked suspect sources")?;
        let banned_sources = IntGauge::new(
            "vakthund_banned_sources",
            "Suspects at or over the ban threshold",
        )?;
        let resync_latency = Histogram::with_opts(
            HistogramOpts::new(
                "vakthund_resync_latency_seconds",
                "Wall time of a resync pass",
            )
            .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;

        registry.register(Box::new(admissions.clone()))?;
        registry.register(Box::new(probes.clone()))?;
        registry.register(Box::new(resyncs.clone()))?;
        registry.register(Box::new(resync_failures.clone()))?;
        registry.register(Box::new(rules_applied.clone()))?;
        registry.register(Box::new(suspects.clone()))?;
        registry.register(Box::new(banned_sources.clone()))?;
        registry.register(Box::new(resync_latency.clone()))?;

        Ok(Self {
            registry,
            admissions,
            probes,
            resyncs,
            resync_failures,
            rules_applied,
            suspects,
            banned_sources,
            resync_latency,
        })
    }

    /// Renders the registry in the prometheus text format.
    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }

    pub fn record_resync(&self, rules: usize, skipped: bool, seconds: f64) {
        self.resyncs.inc();
        if !skipped {
            self.rules_applied.inc_by(rules as u64);
        }
        self.resync_latency.observe(seconds);
    }

    pub fn set_suspects(&self, tracked: usize, banned: usize) {
        self.suspects.set(tracked as i64);
        self.banned_sources.set(banned as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_all_series() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.admissions.inc();
        metrics.record_resync(4, false, 0.002);
        metrics.record_resync(4, true, 0.0);
        metrics.set_suspects(3, 1);

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("vakthund_admissions_total 1"));
        assert!(text.contains("vakthund_resyncs_total 2"));
        assert!(text.contains("vakthund_rules_applied_total 4"));
        assert!(text.contains("vakthund_suspects 3"));
        assert!(text.contains("vakthund_banned_sources 1"));
        assert!(text.contains("vakthund_resync_latency_seconds_count 2"));
    }

    #[test]
    fn recorders_are_independent() {
        let first = MetricsRecorder::new().unwrap();
        let second = MetricsRecorder::new().unwrap();
        first.probes.inc();
        assert_eq!(second.probes.get(), 0);
    }
}
