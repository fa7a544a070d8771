//! Meter side of the pipeline: reading, scheduling and message emission.

/// Meter trait and the simulated household meter.
pub mod meter;
pub mod node;
/// Poll interval and device resolution scheduling.
pub mod poller;

pub use meter::{Meter, MeterError, SimulatedMeter};
pub use node::TelemetryNode;
pub use poller::{PollAction, Poller};
