//! Raw meter reading model.

use serde::Serialize;
use serde_json::Value;

use super::lenient::{field, number, strict_bool, text, truthy};

/// Instantaneous power fields in watts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerReading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_w: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_w: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_w: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumption_w: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surplus_w: Option<f64>,
}

/// Cumulative energy counters in watt-hours.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyReading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_total_wh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_total_wh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_total_wh: Option<f64>,
}

/// Grid cutoff warning block.
///
/// `has_warning` is only populated when the meter sent an actual boolean;
/// anything else is "no information" to the staging engine. `flagged`
/// keeps the truthiness of the raw flag for what the node reports
/// downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CutoffReading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_warning: Option<bool>,
    /// Raw flag was truthy (`true`, `1`, `"true"`, ...).
    #[serde(skip)]
    pub flagged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_iso: Option<String>,
}

/// One telemetry reading as delivered by the meter.
///
/// Every field is optional. Build it from untrusted JSON with
/// [`Reading::from_value`], which never fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub power: PowerReading,
    pub energy: EnergyReading,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tariff_band: Option<f64>,
    pub cutoff: CutoffReading,
    /// Meter-side read timestamp, milliseconds since the Unix epoch.
    #[serde(rename = "ts", skip_serializing_if = "Option::is_none")]
    pub ts_ms: Option<i64>,
}

impl Reading {
    /// Extracts a reading from an arbitrary JSON value.
    ///
    /// Unknown shapes, wrong types and missing branches all degrade to
    /// `None` fields.
    pub fn from_value(value: &Value) -> Self {
        let power = PowerReading {
            import_w: number(field(value, &["power", "importW"])),
            export_w: number(field(value, &["power", "exportW"])),
            production_w: number(field(value, &["power", "productionW"])),
            consumption_w: number(field(value, &["power", "consumptionW"])),
            surplus_w: number(field(value, &["power", "surplusW"])),
        };
        let energy = EnergyReading {
            import_total_wh: number(field(value, &["energy", "importTotalWh"])),
            export_total_wh: number(field(value, &["energy", "exportTotalWh"])),
            production_total_wh: number(field(value, &["energy", "productionTotalWh"])),
        };
        let flag = field(value, &["cutoff", "hasWarning"]);
        let cutoff = CutoffReading {
            has_warning: strict_bool(flag),
            flagged: truthy(flag),
            remaining_seconds: number(field(value, &["cutoff", "remainingSeconds"])),
            at_iso: text(field(value, &["cutoff", "atIso"])),
        };

        Self {
            power,
            energy,
            tariff_band: number(value.get("tariffBand")),
            cutoff,
            ts_ms: number(value.get("ts")).map(|ms| ms as i64),
        }
    }

    /// Whether the meter raised the cutoff warning, by truthiness.
    ///
    /// Looser than [`ShedSignal::from_reading`](super::ShedSignal::from_reading),
    /// which only acts on an actual boolean.
    pub fn warning_raised(&self) -> bool {
        self.cutoff.has_warning == Some(true) || self.cutoff.flagged
    }
}
