//! Message envelope flowing from the telemetry side into the engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::signal::ShedSignal;

pub const TOPIC_TELEMETRY: &str = "loadshed/telemetry";
pub const TOPIC_STATUS: &str = "loadshed/telemetry/status";
pub const TOPIC_LOAD_CONTROL_PIN: &str = "loadshed/telemetry/load-control-pin";

/// One input event.
///
/// All fields are optional on the wire; a message may carry a payload, a
/// connectivity status object, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub topic: String,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insight: Option<Value>,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: Value) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_insight(mut self, insight: Value) -> Self {
        self.insight = Some(insight);
        self
    }

    /// Builds a message from any JSON value; non-objects become empty messages.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Self::default();
        };
        let mut take_str = |key: &str| map.remove(key).and_then(|v| v.as_str().map(str::to_owned));
        let topic = take_str("topic").unwrap_or_default();
        let reason = take_str("reason");
        Self {
            topic,
            reason,
            payload: map.remove("payload").unwrap_or(Value::Null),
            status: map.remove("status"),
            insight: map.remove("insight"),
        }
    }

    /// Status object, if the message carries one.
    pub fn status_object(&self) -> Option<&Value> {
        self.status.as_ref().filter(|s| s.is_object())
    }

    pub fn signal(&self) -> ShedSignal {
        ShedSignal::from_payload(&self.payload)
    }
}
