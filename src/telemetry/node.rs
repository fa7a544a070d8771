//! Telemetry node: turns meter reads and link events into messages.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::config::{TelemetryConfig, TelemetryMode};
use crate::message::{Message, TOPIC_LOAD_CONTROL_PIN, TOPIC_STATUS, TOPIC_TELEMETRY};
use crate::signal::{Reading, ShedSignal, SimplifiedMetrics};
use crate::status::{ConnectionStatus, Fill, Shape, StatusDeduper, StatusDisplay};

use super::meter::{MeterError, iso_timestamp};

/// Status text while no meter is resolved.
pub const DEVICE_MISSING_TEXT: &str = "device not configured";

/// Longest error text shown on the status display.
const DISPLAY_ERROR_CHARS: usize = 32;

/// Topic used when logging read failures.
const TOPIC_ERROR: &str = "loadshed/telemetry/error";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TelemetryPayload<'a> {
    #[serde(flatten)]
    metrics: &'a SimplifiedMetrics,
    message_at_iso: Option<String>,
    meter_read_at_iso: Option<String>,
}

/// Meter-facing half of the pipeline.
///
/// Holds the last connectivity snapshot, which is attached to every
/// outgoing message, and the state needed for send-on-change filtering.
#[derive(Debug)]
pub struct TelemetryNode {
    mode: TelemetryMode,
    send_on_change: bool,
    last_metrics: Option<SimplifiedMetrics>,
    last_shedding: Option<ShedSignal>,
    status: ConnectionStatus,
    dedup: StatusDeduper,
    display: StatusDisplay,
}

impl TelemetryNode {
    pub fn new(cfg: &TelemetryConfig, now_ms: u64) -> Self {
        Self {
            mode: cfg.mode,
            send_on_change: cfg.send_on_change,
            last_metrics: None,
            last_shedding: None,
            status: ConnectionStatus::disconnected(None, now_ms),
            dedup: StatusDeduper::new(),
            display: StatusDisplay::new(Fill::Grey, Shape::Ring, "starting"),
        }
    }

    pub fn mode(&self) -> TelemetryMode {
        self.mode
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn display(&self) -> &StatusDisplay {
        &self.display
    }

    /// Marks the meter as unresolved.
    pub fn device_missing(&mut self) -> &StatusDisplay {
        self.display = StatusDisplay::error(DEVICE_MISSING_TEXT);
        &self.display
    }

    /// Handles a link state change reported by the meter.
    ///
    /// Returns a status message only when the normalised status differs
    /// from the last one emitted.
    pub fn on_device_status(&mut self, status: ConnectionStatus) -> Option<Message> {
        self.display = if status.connecting {
            StatusDisplay::new(Fill::Yellow, Shape::Ring, "connecting")
        } else if status.connected {
            StatusDisplay::new(Fill::Green, Shape::Dot, "connected")
        } else {
            match &status.error {
                Some(e) => StatusDisplay::error(format!("error: {e}")),
                None => StatusDisplay::error("disconnected"),
            }
        };
        self.emit_status_if_changed(status, "device")
    }

    /// Turns one read result into at most one outgoing message.
    pub fn on_reading(&mut self, result: Result<Reading, MeterError>, now_ms: u64) -> Option<Message> {
        match result {
            Ok(reading) => match self.mode {
                TelemetryMode::LoadControlPin => self.pin_message(&reading),
                TelemetryMode::Telemetry => self.telemetry_message(&reading, now_ms),
            },
            Err(err) => self.read_failed(&err, now_ms),
        }
    }

    fn pin_message(&mut self, reading: &Reading) -> Option<Message> {
        let shedding = if reading.warning_raised() {
            ShedSignal::Shed
        } else {
            ShedSignal::Unshed
        };
        if self.send_on_change && self.last_shedding == Some(shedding) {
            debug!(signal = %shedding, "unchanged pin value suppressed");
            return None;
        }
        self.last_shedding = Some(shedding);
        Some(Message::new(TOPIC_LOAD_CONTROL_PIN, json!(shedding.as_str())).with_status(self.status_value()))
    }

    fn telemetry_message(&mut self, reading: &Reading, now_ms: u64) -> Option<Message> {
        let metrics = SimplifiedMetrics::from_reading(reading);
        if self.send_on_change && self.last_metrics.as_ref() == Some(&metrics) {
            debug!("unchanged telemetry suppressed");
            return None;
        }

        let read_at_ms = reading
            .ts_ms
            .and_then(|ts| u64::try_from(ts).ok())
            .unwrap_or(now_ms);
        let payload = TelemetryPayload {
            metrics: &metrics,
            message_at_iso: iso_timestamp(now_ms),
            meter_read_at_iso: iso_timestamp(read_at_ms),
        };
        let payload = match serde_json::to_value(&payload) {
            Ok(v) => v,
            Err(err) => {
                error!(topic = TOPIC_TELEMETRY, error = %err, "cannot encode telemetry payload");
                return None;
            }
        };
        let raw = match serde_json::to_value(reading) {
            Ok(v) => v,
            Err(err) => {
                error!(topic = TOPIC_TELEMETRY, error = %err, "cannot encode raw reading");
                Value::Null
            }
        };
        let p = &reading.power;
        let insight = json!({
            "telemetry": raw,
            "power": {
                "consumptionW": p.consumption_w.unwrap_or(0.0),
                "surplusW": p.surplus_w.or(p.export_w).unwrap_or(0.0),
            },
            "meta": { "ts": read_at_ms },
        });

        self.last_metrics = Some(metrics);
        Some(
            Message::new(TOPIC_TELEMETRY, payload)
                .with_insight(insight)
                .with_status(self.status_value()),
        )
    }

    fn read_failed(&mut self, err: &MeterError, now_ms: u64) -> Option<Message> {
        let message = err.to_string();
        let text = if err.is_timeout() || message.to_lowercase().contains("timed out") {
            "timeout".to_string()
        } else {
            format!("error: {message}")
        };
        self.display = StatusDisplay::error(text.chars().take(DISPLAY_ERROR_CHARS).collect::<String>());
        error!(topic = TOPIC_ERROR, error = %message, "meter read failed");
        self.emit_status_if_changed(ConnectionStatus::disconnected(Some(message), now_ms), "error")
    }

    fn emit_status_if_changed(&mut self, status: ConnectionStatus, reason: &str) -> Option<Message> {
        self.status = status;
        if !self.dedup.accept(&self.status) {
            return None;
        }
        let value = self.status_value();
        Some(
            Message::new(TOPIC_STATUS, value.clone())
                .with_status(value)
                .with_reason(reason),
        )
    }

    fn status_value(&self) -> Value {
        json!({
            "connected": self.status.connected,
            "connecting": self.status.connecting,
            "error": self.status.error,
            "ts": self.status.ts_ms,
        })
    }
}
