//! # Vakthund Detection Engine
//!
//! Tracks sources that probe paths the gate never declared. Each source
//! accumulates a hit count from its first sighting until the expiry sweep
//! forgets it; sources at or above the ban threshold are handed to the
//! prevention layer.

pub mod suspects;

pub use suspects::{SuspectRecord, SuspectTable};
