//! Signal extraction: meter readings to simplified metrics and shed signals.

/// Tri-state shed signal.
pub mod extract;
pub mod lenient;
/// Raw meter reading model.
pub mod reading;
/// Unit conversion and derived ratios.
pub mod simplify;

pub use extract::ShedSignal;
pub use reading::Reading;
pub use simplify::SimplifiedMetrics;
