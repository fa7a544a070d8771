//! Poll and device-resolution scheduling.
//!
//! The poller never sleeps itself; callers ask what is due at a given time
//! and report back what happened, so a manual clock can drive it.

/// Poll interval used when none is configured (ms).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;

/// Shortest allowed poll interval (ms).
pub const MIN_POLL_INTERVAL_MS: u64 = 500;

/// Delay between attempts to resolve a missing device (ms).
pub const RESOLVE_RETRY_MS: u64 = 1_000;

/// Applies the default and the floor to a configured poll interval.
///
/// `0` means "not configured".
pub fn effective_poll_interval(configured_ms: u64) -> u64 {
    let requested = if configured_ms == 0 {
        DEFAULT_POLL_INTERVAL_MS
    } else {
        configured_ms
    };
    requested.max(MIN_POLL_INTERVAL_MS)
}

/// What the caller should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    /// Try to resolve the meter.
    Resolve,
    /// Read the meter.
    Read,
    /// Nothing is due yet.
    Idle,
}

/// Fixed-rate poll schedule with a resolve phase in front of it.
#[derive(Debug, Clone)]
pub struct Poller {
    interval_ms: u64,
    next_at_ms: u64,
    resolved: bool,
}

impl Poller {
    /// Creates a poller whose first resolve attempt is due at `now_ms`.
    pub fn new(configured_interval_ms: u64, now_ms: u64) -> Self {
        Self {
            interval_ms: effective_poll_interval(configured_interval_ms),
            next_at_ms: now_ms,
            resolved: false,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// When the next action falls due.
    pub fn next_due_ms(&self) -> u64 {
        self.next_at_ms
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn action(&self, now_ms: u64) -> PollAction {
        if now_ms < self.next_at_ms {
            PollAction::Idle
        } else if self.resolved {
            PollAction::Read
        } else {
            PollAction::Resolve
        }
    }

    /// The device was found; the first read is due immediately.
    pub fn resolved(&mut self, now_ms: u64) {
        self.resolved = true;
        self.next_at_ms = now_ms;
    }

    /// The device is still missing; try again after [`RESOLVE_RETRY_MS`].
    pub fn resolve_failed(&mut self, now_ms: u64) {
        self.resolved = false;
        self.next_at_ms = now_ms + RESOLVE_RETRY_MS;
    }

    /// A read happened; schedules the next one on the fixed-rate grid.
    ///
    /// Ticks missed while the caller was late are skipped, not replayed.
    pub fn polled(&mut self, now_ms: u64) {
        self.next_at_ms += self.interval_ms;
        if self.next_at_ms <= now_ms {
            let behind = now_ms - self.next_at_ms;
            self.next_at_ms += (behind / self.interval_ms + 1) * self.interval_ms;
        }
    }
}
