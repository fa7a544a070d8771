//! Upstream connectivity snapshots and the status display side channel.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::signal::lenient::{text, truthy};

/// Error text beyond this many characters does not count as a change.
pub const SIGNATURE_ERROR_PREFIX: usize = 64;

/// Last known upstream connectivity state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub connecting: bool,
    pub error: Option<String>,
    /// When this snapshot was normalised, milliseconds since the Unix epoch.
    #[serde(rename = "ts")]
    pub ts_ms: u64,
}

impl ConnectionStatus {
    /// Normalises a loosely shaped status object.
    pub fn from_value(value: &Value, now_ms: u64) -> Self {
        Self {
            connected: truthy(value.get("connected")),
            connecting: truthy(value.get("connecting")),
            error: text(value.get("error")),
            ts_ms: now_ms,
        }
    }

    pub fn disconnected(error: Option<String>, now_ms: u64) -> Self {
        Self {
            connected: false,
            connecting: false,
            error,
            ts_ms: now_ms,
        }
    }

    /// Identity used to suppress redundant status events.
    pub fn signature(&self) -> StatusSignature {
        StatusSignature {
            connected: self.connected,
            connecting: self.connecting,
            error: self
                .error
                .as_ref()
                .map(|e| e.chars().take(SIGNATURE_ERROR_PREFIX).collect()),
        }
    }
}

/// The fields of a [`ConnectionStatus`] that matter for change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSignature {
    connected: bool,
    connecting: bool,
    error: Option<String>,
}

/// Remembers the last emitted signature and filters repeats.
#[derive(Debug, Default)]
pub struct StatusDeduper {
    last: Option<StatusSignature>,
}

impl StatusDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when `status` differs from the previously accepted one.
    pub fn accept(&mut self, status: &ConnectionStatus) -> bool {
        let signature = status.signature();
        if self.last.as_ref() == Some(&signature) {
            return false;
        }
        self.last = Some(signature);
        true
    }
}

/// Colour hint for a status display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Fill {
    Grey,
    Green,
    Yellow,
    Red,
}

/// Shape hint for a status display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Dot,
    Ring,
}

/// Operator-facing status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusDisplay {
    pub fill: Fill,
    pub shape: Shape,
    pub text: String,
}

impl StatusDisplay {
    pub fn new(fill: Fill, shape: Shape, text: impl Into<String>) -> Self {
        Self {
            fill,
            shape,
            text: text.into(),
        }
    }

    /// Display shown before the first input arrives.
    pub fn idle(stage: usize, max_stage: usize) -> Self {
        Self::new(Fill::Grey, Shape::Ring, stage_text(stage, max_stage))
    }

    /// Display for the current stage, tinted by connectivity.
    pub fn for_stage(status: &ConnectionStatus, stage: usize, max_stage: usize) -> Self {
        let text = stage_text(stage, max_stage);
        let shedding = stage > 0;
        if status.connecting {
            Self::new(Fill::Yellow, Shape::Ring, text)
        } else if status.connected {
            let fill = if shedding { Fill::Yellow } else { Fill::Green };
            Self::new(fill, Shape::Dot, text)
        } else {
            let fill = if shedding { Fill::Yellow } else { Fill::Red };
            Self::new(fill, Shape::Ring, text)
        }
    }

    /// Persistent error display.
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Fill::Red, Shape::Ring, text)
    }

    pub fn is_error(&self) -> bool {
        self.fill == Fill::Red
    }
}

impl fmt::Display for StatusDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}/{:?}] {}", self.fill, self.shape, self.text)
    }
}

pub fn stage_text(stage: usize, max_stage: usize) -> String {
    format!("stage {stage}/{max_stage}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status(connected: bool, connecting: bool) -> ConnectionStatus {
        ConnectionStatus {
            connected,
            connecting,
            error: None,
            ts_ms: 0,
        }
    }

    #[test]
    fn normalises_loose_status_objects() {
        let s = ConnectionStatus::from_value(&json!({ "connected": 1, "error": "" }), 7);
        assert!(s.connected);
        assert!(!s.connecting);
        assert_eq!(s.error, None);
        assert_eq!(s.ts_ms, 7);

        let s = ConnectionStatus::from_value(&json!("garbage"), 0);
        assert_eq!(s, status(false, false));
    }

    #[test]
    fn dedup_ignores_timestamp_and_long_error_tails() {
        let mut dedup = StatusDeduper::new();
        let a = ConnectionStatus::disconnected(Some("x".repeat(70)), 1);
        let mut b = a.clone();
        b.ts_ms = 99;
        b.error = Some(format!("{}{}", "x".repeat(64), "different tail"));
        assert!(dedup.accept(&a));
        assert!(!dedup.accept(&b));
        assert!(dedup.accept(&status(true, false)));
        assert!(!dedup.accept(&status(true, false)));
    }

    #[test]
    fn display_tint_follows_connectivity_and_stage() {
        let d = StatusDisplay::for_stage(&status(false, true), 1, 3);
        assert_eq!((d.fill, d.shape), (Fill::Yellow, Shape::Ring));
        assert_eq!(d.text, "stage 1/3");

        let d = StatusDisplay::for_stage(&status(true, false), 0, 3);
        assert_eq!((d.fill, d.shape), (Fill::Green, Shape::Dot));
        let d = StatusDisplay::for_stage(&status(true, false), 2, 3);
        assert_eq!((d.fill, d.shape), (Fill::Yellow, Shape::Dot));

        let d = StatusDisplay::for_stage(&status(false, false), 0, 3);
        assert_eq!((d.fill, d.shape), (Fill::Red, Shape::Ring));
        let d = StatusDisplay::for_stage(&status(false, false), 3, 3);
        assert_eq!((d.fill, d.shape), (Fill::Yellow, Shape::Ring));
    }

    #[test]
    fn idle_display_is_grey() {
        let d = StatusDisplay::idle(0, 2);
        assert_eq!(d, StatusDisplay::new(Fill::Grey, Shape::Ring, "stage 0/2"));
    }
}
