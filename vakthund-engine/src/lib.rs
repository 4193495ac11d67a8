//! # vakthund-engine
//!
//! Wires the gate together for a running process: driver selection, the
//! startup resync, the HTTP listeners and the expiry sweeper.

mod error;
pub mod runtime;
pub mod sweeper;

pub use error::EngineError;
pub use runtime::{build_driver, build_gate, run_gateway};
pub use sweeper::run_sweeper;
