/// Wall-clock sources.
pub mod clock;
/// Minimum on/off dwell guard.
pub mod dwell;
pub mod staging;
pub mod state;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use staging::Engine;
pub use state::EngineState;
pub use types::{CommandBatch, EngineOutput, EngineSnapshot, LoadCommand, LoadSpec, LoadState};
