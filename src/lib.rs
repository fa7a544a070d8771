//! Staged load shedding driven by a smart meter's overload warning.
//!
//! Telemetry readings are reduced to a tri-state shed signal; the staging
//! engine turns each edge into one more (or one fewer) disabled load while
//! honouring per-load minimum on/off times.

/// REST API over a finished run.
#[cfg(feature = "api")]
pub mod api;
pub mod config;
/// Staging engine, dwell guard and clocks.
pub mod engine;
pub mod host;
pub mod journal;
pub mod message;
/// Replay and simulation drivers.
pub mod runner;
/// Signal extraction from meter readings.
pub mod signal;
pub mod sink;
pub mod status;
pub mod telemetry;
