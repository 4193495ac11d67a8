//! # Vakthund Telemetry and Monitoring
//!
//! Log subscriber setup and the prometheus registry shared by the gate,
//! the synthesizer and the sweeper.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
