//! Meter abstraction and a seeded simulated household meter.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use chrono::{DateTime, SecondsFormat, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};
use thiserror::Error;

use crate::config::SimulationConfig;
use crate::signal::reading::{CutoffReading, EnergyReading, PowerReading};
use crate::signal::Reading;
use crate::status::ConnectionStatus;

const MS_PER_HOUR: f64 = 3_600_000.0;
const MS_PER_DAY: u64 = 86_400_000;

/// Failure to obtain a reading.
#[derive(Debug, Error)]
pub enum MeterError {
    #[error("read timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
    #[error("meter I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("meter disconnected: {0}")]
    Disconnected(String),
}

impl MeterError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, MeterError::Timeout { .. })
    }
}

/// A source of meter readings.
pub trait Meter {
    /// Takes one reading at `now_ms`.
    ///
    /// # Errors
    ///
    /// Returns a [`MeterError`] when the meter cannot be read.
    fn read(&mut self, now_ms: u64) -> Result<Reading, MeterError>;

    /// Pending connectivity change, if any, to report before the next read.
    fn take_status(&mut self, _now_ms: u64) -> Option<ConnectionStatus> {
        None
    }

    /// Tells the meter a controllable load was switched.
    ///
    /// Real meters only observe the effect; simulated ones model it.
    fn set_load_enabled(&mut self, _name: &str, _enabled: bool) {}
}

/// Formats epoch milliseconds as an ISO-8601 UTC timestamp.
pub fn iso_timestamp(ms: u64) -> Option<String> {
    let ms = i64::try_from(ms).ok()?;
    DateTime::<Utc>::from_timestamp_millis(ms).map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Samples zero-mean Gaussian noise using the Box-Muller transform.
fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-9, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
    z0 * std_dev
}

/// Link state as the simulated meter reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Fresh,
    Connecting,
    Connected,
    Failed,
}

/// A household meter with sinusoidal demand, daytime PV and switchable
/// appliances.
///
/// Consumption is `base + amp * sin(2π * day_fraction + phase)` plus
/// Gaussian noise plus every enabled appliance. PV follows a half-sine
/// between sunrise and sunset. The cutoff warning is raised while import
/// exceeds the contract limit.
///
/// # Examples
///
/// ```
/// use loadshed::config::SimulationConfig;
/// use loadshed::telemetry::meter::{Meter, SimulatedMeter};
///
/// let cfg = SimulationConfig::default();
/// let mut meter = SimulatedMeter::new(&cfg);
/// let reading = meter.read(cfg.start_ms).expect("no timeouts by default");
/// assert!(reading.power.consumption_w.is_some());
/// ```
#[derive(Debug, Clone)]
pub struct SimulatedMeter {
    cfg: SimulationConfig,
    /// Appliances currently drawing power.
    enabled: BTreeMap<String, bool>,
    import_total_wh: f64,
    export_total_wh: f64,
    production_total_wh: f64,
    last_read_ms: Option<u64>,
    link: Link,
    rng: StdRng,
}

impl SimulatedMeter {
    /// Creates a meter with every configured appliance enabled.
    pub fn new(cfg: &SimulationConfig) -> Self {
        Self {
            enabled: cfg.appliance_kw.keys().map(|k| (k.clone(), true)).collect(),
            cfg: cfg.clone(),
            import_total_wh: 0.0,
            export_total_wh: 0.0,
            production_total_wh: 0.0,
            last_read_ms: None,
            link: Link::Fresh,
            rng: StdRng::seed_from_u64(cfg.seed),
        }
    }

    fn hour_of_day(now_ms: u64) -> f64 {
        (now_ms % MS_PER_DAY) as f64 / MS_PER_HOUR
    }

    /// Household demand without switchable appliances (kW).
    fn base_demand_kw(&mut self, now_ms: u64) -> f64 {
        let day_frac = Self::hour_of_day(now_ms) / 24.0;
        let angle = 2.0 * PI * day_frac + self.cfg.phase_rad;
        let noise = gaussian_noise(&mut self.rng, self.cfg.noise_std_kw);
        (self.cfg.base_kw + self.cfg.amp_kw * angle.sin() + noise).max(0.0)
    }

    fn appliance_demand_kw(&self) -> f64 {
        self.cfg
            .appliance_kw
            .iter()
            .filter(|(name, _)| self.enabled.get(*name).copied().unwrap_or(false))
            .map(|(_, kw)| kw.max(0.0))
            .sum()
    }

    fn production_kw(&self, now_ms: u64) -> f64 {
        let hour = Self::hour_of_day(now_ms);
        let (rise, set) = (self.cfg.sunrise_hour, self.cfg.sunset_hour);
        if hour < rise || hour >= set || set <= rise {
            return 0.0;
        }
        let frac = (hour - rise) / (set - rise);
        self.cfg.pv_peak_kw.max(0.0) * (PI * frac).sin()
    }

    /// Whether `name` is currently drawing power.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.get(name).copied().unwrap_or(false)
    }
}

impl Meter for SimulatedMeter {
    fn read(&mut self, now_ms: u64) -> Result<Reading, MeterError> {
        if self.cfg.timeout_probability > 0.0 && self.rng.random_bool(self.cfg.timeout_probability.min(1.0)) {
            self.link = Link::Failed;
            return Err(MeterError::Timeout { after_ms: 1_000 });
        }

        let consumption_kw = self.base_demand_kw(now_ms) + self.appliance_demand_kw();
        let production_kw = self.production_kw(now_ms);
        let import_kw = (consumption_kw - production_kw).max(0.0);
        let export_kw = (production_kw - consumption_kw).max(0.0);

        let hours = self
            .last_read_ms
            .map(|last| now_ms.saturating_sub(last) as f64 / MS_PER_HOUR)
            .unwrap_or(0.0);
        self.import_total_wh += import_kw * 1_000.0 * hours;
        self.export_total_wh += export_kw * 1_000.0 * hours;
        self.production_total_wh += production_kw * 1_000.0 * hours;
        self.last_read_ms = Some(now_ms);

        let has_warning = import_kw > self.cfg.contract_kw;
        let lead_ms = (self.cfg.warning_lead_seconds.max(0.0) * 1_000.0) as u64;
        let cutoff = if has_warning {
            CutoffReading {
                has_warning: Some(true),
                flagged: true,
                remaining_seconds: Some(self.cfg.warning_lead_seconds.max(0.0)),
                at_iso: iso_timestamp(now_ms.saturating_add(lead_ms)),
            }
        } else {
            CutoffReading {
                has_warning: Some(false),
                ..CutoffReading::default()
            }
        };

        Ok(Reading {
            power: PowerReading {
                import_w: Some(import_kw * 1_000.0),
                export_w: Some(export_kw * 1_000.0),
                production_w: Some(production_kw * 1_000.0),
                consumption_w: Some(consumption_kw * 1_000.0),
                surplus_w: Some((production_kw - consumption_kw) * 1_000.0),
            },
            energy: EnergyReading {
                import_total_wh: Some(self.import_total_wh),
                export_total_wh: Some(self.export_total_wh),
                production_total_wh: Some(self.production_total_wh),
            },
            tariff_band: Some(if (7.0..23.0).contains(&Self::hour_of_day(now_ms)) { 1.0 } else { 3.0 }),
            cutoff,
            ts_ms: i64::try_from(now_ms).ok(),
        })
    }

    fn take_status(&mut self, now_ms: u64) -> Option<ConnectionStatus> {
        let (next, status) = match self.link {
            Link::Fresh => (
                Link::Connecting,
                ConnectionStatus {
                    connecting: true,
                    ..ConnectionStatus::disconnected(None, now_ms)
                },
            ),
            Link::Connecting | Link::Failed => (
                Link::Connected,
                ConnectionStatus {
                    connected: true,
                    ..ConnectionStatus::disconnected(None, now_ms)
                },
            ),
            Link::Connected => return None,
        };
        self.link = next;
        Some(status)
    }

    fn set_load_enabled(&mut self, name: &str, enabled: bool) {
        if let Some(flag) = self.enabled.get_mut(name) {
            *flag = enabled;
        }
    }
}
