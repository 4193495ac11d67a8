//! ## vakthund-detection::suspects
//! **Per-source hit counters with first-seen expiry**
//!
//! ### Expectations:
//! - A record's count only grows while the record exists
//! - Iteration order is stable (ordered by address) so ban rules are
//!   synthesized in the same order on every pass
//! - Expiry is keyed on the first sighting, not the latest one: a source
//!   that probes continuously is still forgotten one retention window after
//!   its first hit

use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Probing history for one source address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspectRecord {
    /// Time of the first unmatched request from this source.
    pub first_seen: DateTime<Utc>,
    /// Unmatched requests since `first_seen`.
    pub count: u32,
}

impl SuspectRecord {
    /// Whether the record is strictly older than `retention` at `now`.
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        self.first_seen
            .checked_add_signed(retention)
            .is_some_and(|deadline| now > deadline)
    }
}

/// All suspect records, keyed by source address.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuspectTable {
    records: BTreeMap<IpAddr, SuspectRecord>,
}

impl SuspectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one unmatched request from `source` and returns the updated
    /// record. The first hit creates the record with `first_seen = now`.
    pub fn record_hit(&mut self, source: IpAddr, now: DateTime<Utc>) -> SuspectRecord {
        let record = self
            .records
            .entry(source)
            .and_modify(|record| record.count = record.count.saturating_add(1))
            .or_insert(SuspectRecord {
                first_seen: now,
                count: 1,
            });
        debug!(source = %source, count = record.count, "suspect hit recorded");
        *record
    }

    /// Drops every record strictly older than `retention`, returning the
    /// addresses that were forgotten.
    pub fn expire(&mut self, now: DateTime<Utc>, retention: Duration) -> Vec<IpAddr> {
        let expired: Vec<IpAddr> = self
            .records
            .iter()
            .filter(|(_, record)| record.is_expired(now, retention))
            .map(|(source, _)| *source)
            .collect();
        for source in &expired {
            self.records.remove(source);
        }
        expired
    }

    /// Sources whose count has reached `threshold`, in address order.
    pub fn over_threshold(&self, threshold: u32) -> impl Iterator<Item = IpAddr> + '_ {
        self.records
            .iter()
            .filter(move |(_, record)| record.count >= threshold)
            .map(|(source, _)| *source)
    }

    pub fn get(&self, source: &IpAddr) -> Option<&SuspectRecord> {
        self.records.get(source)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
