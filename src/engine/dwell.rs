//! Minimum on/off dwell guard.

use std::time::Duration;

use super::types::{LoadSpec, LoadState};

/// Minimum dwell durations for one load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DwellPolicy {
    pub min_on: Duration,
    pub min_off: Duration,
}

impl DwellPolicy {
    pub fn new(min_on: Duration, min_off: Duration) -> Self {
        Self { min_on, min_off }
    }

    /// Builds the policy from configured seconds.
    ///
    /// Negative and NaN values mean "no restriction"; `+inf` blocks the
    /// transition for good.
    pub fn from_spec(spec: &LoadSpec) -> Self {
        Self {
            min_on: seconds(spec.min_on_seconds),
            min_off: seconds(spec.min_off_seconds),
        }
    }

    /// Whether `state` may transition to `next_enabled` at `now_ms`.
    ///
    /// Requests that do not change the state are always permitted. A clock
    /// that went backwards counts as zero elapsed time.
    pub fn permits(&self, state: &LoadState, next_enabled: bool, now_ms: u64) -> bool {
        let elapsed = Duration::from_millis(now_ms.saturating_sub(state.last_change_ms));
        match (state.enabled, next_enabled) {
            (true, false) => elapsed >= self.min_on,
            (false, true) => elapsed >= self.min_off,
            _ => true,
        }
    }

    /// Time left before a transition to `next_enabled` becomes possible.
    pub fn remaining(&self, state: &LoadState, next_enabled: bool, now_ms: u64) -> Duration {
        let elapsed = Duration::from_millis(now_ms.saturating_sub(state.last_change_ms));
        let required = match (state.enabled, next_enabled) {
            (true, false) => self.min_on,
            (false, true) => self.min_off,
            _ => Duration::ZERO,
        };
        required.saturating_sub(elapsed)
    }
}

fn seconds(value: f64) -> Duration {
    if value > 0.0 {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}
