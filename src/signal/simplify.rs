//! Unit conversion and derived ratios for meter readings.

use serde::Serialize;

use super::reading::Reading;

/// Instantaneous power in kilowatts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerKw {
    pub import_kw: f64,
    pub export_kw: f64,
    pub production_kw: f64,
    /// `max(0, import + production - export)`.
    pub consumption_kw: f64,
    /// Meter-reported surplus, falling back to export.
    pub surplus_kw: f64,
}

/// Instantaneous utilisation ratios, each in `[0, 100]` with one decimal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UtilityPercent {
    /// Share of production consumed on site.
    pub self_consumption: f64,
    /// Share of production sold to the grid.
    pub grid_sale: f64,
    /// Share of consumption bought from the grid.
    pub grid_purchase: f64,
}

/// Cumulative energy counters in kilowatt-hours.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyKwh {
    pub import_total_kwh: f64,
    pub export_total_kwh: f64,
    pub production_total_kwh: f64,
}

/// Cutoff warning as seen downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CutoffInfo {
    pub has_warning: bool,
    /// Seconds until cutoff, only reported while the warning is active.
    pub remaining_seconds: Option<f64>,
    pub at_iso: Option<String>,
}

/// Simplified metrics record derived from one [`Reading`].
///
/// # Examples
///
/// ```
/// use loadshed::signal::{Reading, SimplifiedMetrics};
///
/// let metrics = SimplifiedMetrics::from_reading(&Reading::default());
/// assert_eq!(metrics.power.consumption_kw, 0.0);
/// assert!(!metrics.cutoff.has_warning);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplifiedMetrics {
    pub power: PowerKw,
    pub utility_percent: UtilityPercent,
    pub energy: EnergyKwh,
    pub tariff_band: f64,
    pub cutoff: CutoffInfo,
}

impl SimplifiedMetrics {
    /// Converts a reading into kW/kWh units with derived percentages.
    ///
    /// Missing inputs count as zero and every ratio with a non-positive
    /// denominator reports 0 %.
    pub fn from_reading(reading: &Reading) -> Self {
        let p = &reading.power;
        let import_w = p.import_w.unwrap_or(0.0);
        let export_w = p.export_w.unwrap_or(0.0);
        let production_w = p.production_w.unwrap_or(0.0);
        let consumption_w = (import_w + production_w - export_w).max(0.0);
        let surplus_w = p.surplus_w.unwrap_or(export_w);
        let used_locally_w = (production_w - export_w).max(0.0);

        let utility_percent = UtilityPercent {
            self_consumption: percent(used_locally_w, production_w),
            grid_sale: percent(export_w, production_w),
            grid_purchase: percent(import_w, consumption_w),
        };

        let e = &reading.energy;
        let energy = EnergyKwh {
            import_total_kwh: kilo(e.import_total_wh.unwrap_or(0.0)),
            export_total_kwh: kilo(e.export_total_wh.unwrap_or(0.0)),
            production_total_kwh: kilo(e.production_total_wh.unwrap_or(0.0)),
        };

        let has_warning = reading.warning_raised();
        let cutoff = CutoffInfo {
            has_warning,
            remaining_seconds: has_warning
                .then(|| finite_or_zero(reading.cutoff.remaining_seconds.unwrap_or(0.0))),
            at_iso: reading.cutoff.at_iso.clone(),
        };

        Self {
            power: PowerKw {
                import_kw: kilo(import_w),
                export_kw: kilo(export_w),
                production_kw: kilo(production_w),
                consumption_kw: kilo(consumption_w),
                surplus_kw: kilo(surplus_w),
            },
            utility_percent,
            energy,
            tariff_band: finite_or_zero(reading.tariff_band.unwrap_or(0.0)),
            cutoff,
        }
    }
}

fn kilo(value: f64) -> f64 {
    finite_or_zero(value / 1000.0)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// `part / whole` as a clamped percentage with one decimal.
fn percent(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        return 0.0;
    }
    let ratio = finite_or_zero(part / whole).clamp(0.0, 1.0);
    round1(ratio * 100.0)
}

fn round1(value: f64) -> f64 {
    finite_or_zero((value * 10.0).round() / 10.0)
}
