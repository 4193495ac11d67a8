//! # vakthund-core
//!
//! The gate: process-wide state (the gateway spec with its live bindings and
//! the suspect table) and the operations that mutate it and trigger a
//! firewall resync.
//!
//! ### Expectations:
//! - Every state mutation is followed by a full resync from a fresh snapshot
//! - Resync passes never interleave; the last one to finish reflects the
//!   latest state
//! - No lock on the state is held across an await point
//!
//! ### Key Submodules:
//! - `gate`: admission, probe tracking, expiry sweep and resync
//! - `state`: the serializable `GateState`
//! - `time`: wall clock and a manually advanced virtual clock for tests

pub mod error;
pub mod gate;
pub mod state;
pub mod time;

pub mod prelude {
    pub use crate::error::*;
    pub use crate::gate::*;
    pub use crate::state::*;
    pub use crate::time::*;
}

pub use error::GateError;
pub use gate::{Admission, Gate, GateSettings};
pub use state::GateState;
pub use time::{Clock, SystemClock, VirtualClock};
