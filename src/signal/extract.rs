//! Tri-state shed signal derivation.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use super::lenient::{field, strict_bool};
use super::reading::Reading;

/// Direction requested by the overload signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShedSignal {
    /// Overload warning raised: shed one more stage.
    Shed,
    /// Warning explicitly cleared: restore one stage.
    Unshed,
    /// No usable information. Never equivalent to `Unshed`.
    #[serde(rename = "none")]
    Hold,
}

impl ShedSignal {
    /// Maps an explicit warning flag to a signal.
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Self::Shed,
            Some(false) => Self::Unshed,
            None => Self::Hold,
        }
    }

    /// Derives the signal carried by a raw reading.
    pub fn from_reading(reading: &Reading) -> Self {
        Self::from_flag(reading.cutoff.has_warning)
    }

    /// Derives the signal carried by a message payload.
    ///
    /// Accepts either a simplified metrics payload (`cutoff.hasWarning`
    /// boolean) or a load-control pin payload (the strings `"shed"` /
    /// `"unshed"`).
    pub fn from_payload(payload: &Value) -> Self {
        if let Some(flag) = strict_bool(field(payload, &["cutoff", "hasWarning"])) {
            return Self::from_flag(Some(flag));
        }
        match payload.as_str() {
            Some("shed") => Self::Shed,
            Some("unshed") => Self::Unshed,
            _ => Self::Hold,
        }
    }

    pub fn is_edge(self) -> bool {
        self != Self::Hold
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shed => "shed",
            Self::Unshed => "unshed",
            Self::Hold => "none",
        }
    }
}

impl fmt::Display for ShedSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
