//! # Vakthund API Services
//!
//! HTTP surface of the gate, served on the management port:
//!
//! - `ANY /{port}/{path}`: admission; binds the route to the requester
//! - `GET /configs`: JSON dump of the gate state
//! - `GET /favicon.ico`: placeholder so browsers do not count as probes
//! - anything else: counted against the requester as a probe
//!
//! Prometheus metrics get their own router so `/metrics` never shadows the
//! probe fallback.

mod error;
pub mod rest;

pub use error::ApiError;
pub use rest::{metrics_router, router, GREETING};
