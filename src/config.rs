//! TOML-based controller configuration and preset definitions.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::engine::LoadSpec;
use crate::signal::lenient::{number, text};
use crate::telemetry::poller::effective_poll_interval;

/// Top-level configuration parsed from TOML.
///
/// Every section has defaults. Load from TOML with
/// [`Config::from_toml_file`] or start from a preset with
/// [`Config::from_preset`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Ordered load list; index 0 is shed first.
    #[serde(default)]
    pub loads: Vec<LoadSpec>,
    /// Telemetry node parameters.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Staging engine options.
    #[serde(default)]
    pub staging: StagingConfig,
    /// Simulated meter used by `simulate`.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// What the telemetry node emits on each poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryMode {
    /// Simplified metrics with timestamps and an insight block.
    #[default]
    Telemetry,
    /// Bare `"shed"` / `"unshed"` payloads.
    LoadControlPin,
}

/// Telemetry node parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Meter reference. Without one the node never resolves a device.
    pub device: Option<String>,
    /// Requested poll interval (ms); `0` means the default.
    pub poll_interval_ms: u64,
    /// Suppress messages identical to the previous one.
    pub send_on_change: bool,
    pub mode: TelemetryMode,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            device: Some("meter".to_string()),
            poll_interval_ms: 10_000,
            send_on_change: false,
            mode: TelemetryMode::Telemetry,
        }
    }
}

impl TelemetryConfig {
    /// Poll interval actually used, after defaulting and flooring.
    pub fn effective_poll_interval_ms(&self) -> u64 {
        effective_poll_interval(self.poll_interval_ms)
    }
}

/// Staging engine options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StagingConfig {
    /// Re-apply the current stage on every poll without a new edge, so
    /// toggles deferred by dwell times complete without waiting for one.
    pub reevaluate_on_poll: bool,
}

/// Simulated meter parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Master random seed.
    pub seed: u64,
    /// Number of poller actions to run (must be > 0).
    pub steps: usize,
    /// Simulated start time (ms since the Unix epoch).
    pub start_ms: u64,
    /// Baseline household consumption (kW).
    pub base_kw: f64,
    /// Daily sinusoidal amplitude (kW).
    pub amp_kw: f64,
    /// Phase offset (radians).
    pub phase_rad: f64,
    /// Gaussian noise standard deviation (kW).
    pub noise_std_kw: f64,
    /// Peak PV production (kW).
    pub pv_peak_kw: f64,
    /// Sunrise, hour of day (UTC).
    pub sunrise_hour: f64,
    /// Sunset, hour of day (UTC).
    pub sunset_hour: f64,
    /// Import above this raises the cutoff warning (kW, must be > 0).
    pub contract_kw: f64,
    /// Countdown reported with a raised warning (s).
    pub warning_lead_seconds: f64,
    /// Chance that a read times out (0.0–1.0).
    pub timeout_probability: f64,
    /// Rated power of each controllable load while enabled (kW), by name.
    pub appliance_kw: BTreeMap<String, f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            steps: 96,
            start_ms: 1_717_200_000_000,
            base_kw: 1.2,
            amp_kw: 0.8,
            phase_rad: 1.2,
            noise_std_kw: 0.1,
            pv_peak_kw: 3.0,
            sunrise_hour: 6.0,
            sunset_hour: 20.0,
            contract_kw: 3.0,
            warning_lead_seconds: 120.0,
            timeout_probability: 0.0,
            appliance_kw: BTreeMap::new(),
        }
    }
}

/// Fatal configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read \"{}\": {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown preset \"{name}\", available: {available}")]
    UnknownPreset { name: String, available: String },
    #[error("config error: {field}: {message}")]
    Invalid { field: String, message: String },
}

/// Non-fatal finding about the load list.
///
/// The engine tolerates all of these; they are logged and, for an empty
/// list, surface as a degraded status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ConfigIssue {
    /// Dotted field path (e.g., `"loads[2].name"`).
    pub field: String,
    pub message: String,
}

fn load(name: &str, min_on_seconds: f64, min_off_seconds: f64, kw: f64) -> (LoadSpec, (String, f64)) {
    (
        LoadSpec::new(name, min_on_seconds, min_off_seconds),
        (name.to_string(), kw),
    )
}

impl Config {
    /// Household preset: pool pump, EV charger and dishwasher on a 3 kW
    /// contract, polled every 15 minutes over one day.
    pub fn household() -> Self {
        let (loads, appliance_kw): (Vec<_>, BTreeMap<_, _>) = [
            load("pool", 300.0, 300.0, 1.1),
            load("evcharger", 600.0, 900.0, 2.3),
            load("dishwasher", 0.0, 1_800.0, 1.8),
        ]
        .into_iter()
        .unzip();
        Self {
            loads,
            telemetry: TelemetryConfig {
                poll_interval_ms: 900_000,
                ..TelemetryConfig::default()
            },
            staging: StagingConfig::default(),
            simulation: SimulationConfig {
                appliance_kw,
                ..SimulationConfig::default()
            },
        }
    }

    /// Workshop preset: heavy machines on a 6 kW contract with flaky meter
    /// reads and time-driven re-evaluation.
    pub fn workshop() -> Self {
        let (loads, appliance_kw): (Vec<_>, BTreeMap<_, _>) = [
            load("heater", 120.0, 120.0, 2.0),
            load("compressor", 60.0, 300.0, 3.0),
            load("welder", 0.0, 0.0, 4.5),
        ]
        .into_iter()
        .unzip();
        Self {
            loads,
            telemetry: TelemetryConfig {
                poll_interval_ms: 60_000,
                send_on_change: true,
                ..TelemetryConfig::default()
            },
            staging: StagingConfig {
                reevaluate_on_poll: true,
            },
            simulation: SimulationConfig {
                steps: 240,
                base_kw: 2.5,
                amp_kw: 1.0,
                noise_std_kw: 0.3,
                pv_peak_kw: 5.0,
                contract_kw: 6.0,
                timeout_probability: 0.05,
                appliance_kw,
                ..SimulationConfig::default()
            },
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["household", "workshop"];

    /// Loads a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownPreset`] if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "household" => Ok(Self::household()),
            "workshop" => Ok(Self::workshop()),
            _ => Err(ConfigError::UnknownPreset {
                name: name.to_string(),
                available: Self::PRESETS.join(", "),
            }),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Validates the telemetry and simulation sections.
    ///
    /// Returns an empty vector if configuration is usable. The load list is
    /// never rejected here; see [`Config::load_issues`].
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut invalid = |field: &str, message: &str| {
            errors.push(ConfigError::Invalid {
                field: field.to_string(),
                message: message.to_string(),
            });
        };

        if self.telemetry.device.as_deref() == Some("") {
            invalid("telemetry.device", "must not be empty; omit it instead");
        }

        let s = &self.simulation;
        if s.steps == 0 {
            invalid("simulation.steps", "must be > 0");
        }
        if s.contract_kw.is_nan() || s.contract_kw <= 0.0 {
            invalid("simulation.contract_kw", "must be > 0");
        }
        if !(0.0..=1.0).contains(&s.timeout_probability) {
            invalid("simulation.timeout_probability", "must be in [0.0, 1.0]");
        }
        if !s.warning_lead_seconds.is_finite() || s.warning_lead_seconds < 0.0 {
            invalid("simulation.warning_lead_seconds", "must be finite and >= 0");
        }
        if s.sunrise_hour >= s.sunset_hour {
            invalid("simulation.sunrise_hour", "must be < simulation.sunset_hour");
        }
        if !(0.0..=24.0).contains(&s.sunset_hour) || s.sunrise_hour < 0.0 {
            invalid("simulation.sunset_hour", "hours must be in [0, 24]");
        }
        if s.noise_std_kw < 0.0 || s.pv_peak_kw < 0.0 {
            invalid("simulation.noise_std_kw", "noise and PV peak must be >= 0");
        }
        for (name, kw) in &s.appliance_kw {
            if !kw.is_finite() || *kw < 0.0 {
                invalid(&format!("simulation.appliance_kw.{name}"), "must be >= 0");
            }
        }

        errors
    }

    /// Non-fatal findings about the load list.
    pub fn load_issues(&self) -> Vec<ConfigIssue> {
        load_issues(&self.loads)
    }
}

/// Reports load list entries the engine will skip or coerce.
pub fn load_issues(loads: &[LoadSpec]) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();
    if loads.is_empty() {
        issues.push(ConfigIssue {
            field: "loads".into(),
            message: "no loads configured; nothing can be shed".into(),
        });
    }

    let mut seen = HashSet::new();
    for (i, spec) in loads.iter().enumerate() {
        match spec.tracked_name() {
            None => issues.push(ConfigIssue {
                field: format!("loads[{i}].name"),
                message: "missing or empty; slot is kept but never switched".into(),
            }),
            Some(name) if !seen.insert(name) => issues.push(ConfigIssue {
                field: format!("loads[{i}].name"),
                message: format!("duplicate \"{name}\"; only the first entry is tracked"),
            }),
            Some(_) => {}
        }
        for (field, value) in [
            ("min_on_seconds", spec.min_on_seconds),
            ("min_off_seconds", spec.min_off_seconds),
        ] {
            let message = if value.is_nan() || value < 0.0 {
                format!("{value} treated as 0")
            } else if value.is_infinite() {
                "infinite; the load never switches in this direction".to_string()
            } else {
                continue;
            };
            issues.push(ConfigIssue {
                field: format!("loads[{i}].{field}"),
                message,
            });
        }
    }
    issues
}

/// Parses a load list from the host's JSON representation.
///
/// Accepts an array of objects with `name` and either `minOnSec`/`minOffSec`
/// or `min_on_seconds`/`min_off_seconds`. Malformed input yields an empty
/// list rather than an error.
pub fn parse_loads_json(raw: &str) -> Vec<LoadSpec> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(err) => {
            warn!(error = %err, "malformed loads JSON; using an empty load list");
            return Vec::new();
        }
    };
    let Some(items) = value.as_array() else {
        warn!("loads JSON is not an array; using an empty load list");
        return Vec::new();
    };

    items
        .iter()
        .map(|item| {
            let seconds = |camel: &str, snake: &str| {
                number(item.get(camel))
                    .or_else(|| number(item.get(snake)))
                    .unwrap_or(0.0)
            };
            LoadSpec {
                name: text(item.get("name")),
                min_on_seconds: seconds("minOnSec", "min_on_seconds"),
                min_off_seconds: seconds("minOffSec", "min_off_seconds"),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn household_preset_valid() {
        let cfg = Config::household();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "household should be valid: {errors:?}");
        assert!(cfg.load_issues().is_empty());
    }

    #[test]
    fn from_preset_unknown() {
        let err = Config::from_preset("nonexistent");
        assert!(matches!(err, Err(ConfigError::UnknownPreset { .. })));
        let msg = err.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(msg.contains("household"));
    }

    #[test]
    fn all_presets_are_valid() {
        for name in Config::PRESETS {
            let cfg = Config::from_preset(name);
            assert!(cfg.is_ok(), "preset \"{name}\" should load");
            let errors = cfg.as_ref().map(|c| c.validate()).unwrap_or_default();
            assert!(
                errors.is_empty(),
                "preset \"{name}\" should be valid: {errors:?}"
            );
        }
    }

    #[test]
    fn presets_rate_every_load() {
        for name in Config::PRESETS {
            let cfg = Config::from_preset(name).expect("preset loads");
            for spec in &cfg.loads {
                let name = spec.tracked_name().expect("preset loads are named");
                assert!(cfg.simulation.appliance_kw.contains_key(name));
            }
        }
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[[loads]]
name = "pool"
min_on_seconds = 0
min_off_seconds = 0

[[loads]]
name = "evcharger"
min_on_seconds = 60
min_off_seconds = 30.5

[telemetry]
device = "meter-1"
poll_interval_ms = 2000
send_on_change = true
mode = "load_control_pin"

[staging]
reevaluate_on_poll = true

[simulation]
seed = 7
steps = 10
contract_kw = 4.5

[simulation.appliance_kw]
pool = 1.5
"#;
        let cfg = Config::from_toml_str(toml);
        assert!(cfg.is_ok(), "valid TOML should parse: {:?}", cfg.err());
        let cfg = cfg.expect("parsed");
        assert_eq!(cfg.loads.len(), 2);
        assert_eq!(cfg.loads[1].min_off_seconds, 30.5);
        assert_eq!(cfg.telemetry.mode, TelemetryMode::LoadControlPin);
        assert!(cfg.staging.reevaluate_on_poll);
        assert_eq!(cfg.simulation.seed, 7);
        assert_eq!(cfg.simulation.appliance_kw.get("pool"), Some(&1.5));
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[[loads]]
name = "pool"
priority = 3
"#;
        let result = Config::from_toml_str(toml);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml = r#"
[simulation]
seed = 99
"#;
        let cfg = Config::from_toml_str(toml).expect("parsed");
        assert_eq!(cfg.simulation.seed, 99);
        assert_eq!(cfg.simulation.steps, 96);
        assert!(cfg.loads.is_empty());
        assert_eq!(cfg.telemetry.poll_interval_ms, 10_000);
        assert!(!cfg.staging.reevaluate_on_poll);
    }

    #[test]
    fn poll_interval_is_floored() {
        let mut cfg = Config::default();
        cfg.telemetry.poll_interval_ms = 100;
        assert_eq!(cfg.telemetry.effective_poll_interval_ms(), 500);
        cfg.telemetry.poll_interval_ms = 0;
        assert_eq!(cfg.telemetry.effective_poll_interval_ms(), 10_000);
    }

    #[test]
    fn validation_catches_zero_steps() {
        let mut cfg = Config::household();
        cfg.simulation.steps = 0;
        let errors = cfg.validate();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Invalid { field, .. } if field == "simulation.steps")
        ));
    }

    #[test]
    fn validation_catches_bad_probability() {
        let mut cfg = Config::household();
        cfg.simulation.timeout_probability = 1.5;
        assert!(!cfg.validate().is_empty());
    }

    #[test]
    fn validation_catches_bad_warning_lead() {
        let mut cfg = Config::household();
        for lead in [-1.0, f64::INFINITY, f64::NAN] {
            cfg.simulation.warning_lead_seconds = lead;
            assert!(cfg.validate().iter().any(
                |e| matches!(e, ConfigError::Invalid { field, .. } if field == "simulation.warning_lead_seconds")
            ));
        }
    }

    #[test]
    fn load_issues_are_reported_not_rejected() {
        let loads = vec![
            LoadSpec::new("a", -5.0, 0.0),
            LoadSpec::unnamed(),
            LoadSpec::new("a", 0.0, f64::NAN),
        ];
        let issues = load_issues(&loads);
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "loads[0].min_on_seconds",
                "loads[1].name",
                "loads[2].name",
                "loads[2].min_off_seconds"
            ]
        );
        assert_eq!(load_issues(&[]).len(), 1);
    }

    #[test]
    fn infinite_dwell_is_reported_but_kept() {
        let cfg = Config::from_toml_str("[[loads]]\nname = \"boiler\"\nmin_on_seconds = inf\n")
            .expect("TOML accepts inf");
        assert_eq!(cfg.loads[0].min_on_seconds, f64::INFINITY);
        let issues = cfg.load_issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "loads[0].min_on_seconds");
        assert!(issues[0].message.contains("never switches"));
    }

    #[test]
    fn loads_json_accepts_both_spellings() {
        let loads = parse_loads_json(
            r#"[{"name":"pool","minOnSec":"60","minOffSec":30},
                {"name":"ev","min_on_seconds":5},
                {"minOnSec":1}]"#,
        );
        assert_eq!(loads.len(), 3);
        assert_eq!(loads[0], LoadSpec::new("pool", 60.0, 30.0));
        assert_eq!(loads[1], LoadSpec::new("ev", 5.0, 0.0));
        assert_eq!(loads[2].tracked_name(), None);
    }

    #[test]
    fn malformed_loads_json_is_empty() {
        assert!(parse_loads_json("[{").is_empty());
        assert!(parse_loads_json(r#"{"name":"pool"}"#).is_empty());
        assert!(parse_loads_json("").is_empty());
    }
}
