//! ## vakthund-core::time
//! **Wall clock and virtual clock**
//!
//! Suspect ages are computed from whatever [`Clock`] the gate is built with.
//! Production uses [`SystemClock`]; tests drive a [`VirtualClock`] forward by
//! hand so expiry can be checked without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed epoch plus an offset that only moves when [`VirtualClock::advance`]
/// is called. Clones share the offset.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    epoch: DateTime<Utc>,
    offset: Arc<AtomicU64>, // Nanoseconds
}

impl VirtualClock {
    pub fn new(epoch: DateTime<Utc>) -> Self {
        Self {
            epoch,
            offset: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn now_ns(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }

    pub fn advance(&self, by: Duration) {
        let ns = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset.fetch_add(ns, Ordering::Release);
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        let offset = i64::try_from(self.now_ns()).unwrap_or(i64::MAX);
        self.epoch + chrono::Duration::nanoseconds(offset)
    }
}
