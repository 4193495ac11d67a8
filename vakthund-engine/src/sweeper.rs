//! ## vakthund-engine::sweeper
//! **Periodic suspect expiry**
//!
//! The first sweep runs one full period after start. A sweep whose resync
//! fails either ends the task with an error (`exit`) or is logged and
//! retried on the next tick (`continue`).

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};
use vakthund_config::SweepFailurePolicy;
use vakthund_core::Gate;

use crate::error::EngineError;

/// Runs until a sweep fails under [`SweepFailurePolicy::Exit`].
#[instrument(level = "info", name = "sweeper", skip(gate))]
pub async fn run_sweeper(
    gate: Arc<Gate>,
    period: Duration,
    policy: SweepFailurePolicy,
) -> Result<(), EngineError> {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(?period, "expiry sweeper started");

    loop {
        ticker.tick().await;
        match gate.sweep().await {
            Ok(expired) => debug!(expired = expired.len(), "sweep complete"),
            Err(err) => match policy {
                SweepFailurePolicy::Exit => {
                    error!(error = %err, "sweep failed, stopping");
                    return Err(EngineError::Sweep(err));
                }
                SweepFailurePolicy::Continue => {
                    warn!(error = %err, "sweep failed, keeping previous rules");
                }
            },
        }
    }
}
