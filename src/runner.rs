//! Replay and simulation drivers.
//!
//! Both drive a [`Host`] on a [`ManualClock`]: `replay` feeds recorded
//! messages, `simulate` runs the simulated meter through the telemetry node.

use std::fmt;
use std::io::{self, BufRead};
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError, load_issues};
use crate::engine::{Clock, EngineOutput, EngineSnapshot, LoadSpec, ManualClock};
use crate::host::Host;
use crate::journal::JournalEntry;
use crate::message::Message;
use crate::signal::lenient::number;
use crate::sink::Sink;
use crate::telemetry::{Meter, PollAction, Poller, SimulatedMeter, TelemetryNode};

/// Failure of a driver run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
    #[error("cannot read input: {0}")]
    Input(#[from] io::Error),
    #[error("cannot write journal \"{}\": {source}", path.display())]
    Journal { path: PathBuf, source: io::Error },
    #[error("API server failed: {0}")]
    Serve(io::Error),
}

/// One meter poll during a simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollSample {
    pub timestamp_ms: u64,
    /// Grid import (kW); `None` when the read failed.
    pub import_kw: Option<f64>,
    pub has_warning: bool,
    /// Stage after the poll was handled.
    pub stage: usize,
}

/// Outcome of a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Engine state when the run stopped.
    pub snapshot: EngineSnapshot,
    /// Every committed command.
    pub journal: Vec<JournalEntry>,
    /// Messages handed to the engine.
    pub messages: usize,
    /// Input lines that were not valid JSON.
    pub skipped: usize,
    pub faults: usize,
    pub delivery_failures: usize,
    /// Per-poll trace; empty for replays.
    pub samples: Vec<PollSample>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run summary")?;
        writeln!(
            f,
            "  stage:             {}/{}",
            self.snapshot.stage, self.snapshot.max_stage
        )?;
        writeln!(f, "  messages:          {}", self.messages)?;
        writeln!(f, "  commands:          {}", self.journal.len())?;
        writeln!(f, "  skipped lines:     {}", self.skipped)?;
        writeln!(f, "  faults:            {}", self.faults)?;
        writeln!(f, "  delivery failures: {}", self.delivery_failures)?;
        if !self.samples.is_empty() {
            let warnings = self.samples.iter().filter(|s| s.has_warning).count();
            let peak = self
                .samples
                .iter()
                .map(|s| s.stage)
                .max()
                .unwrap_or_default();
            writeln!(f, "  polls:             {}", self.samples.len())?;
            writeln!(f, "  warning polls:     {warnings}")?;
            writeln!(f, "  peak stage:        {peak}")?;
        }
        for load in &self.snapshot.loads {
            writeln!(
                f,
                "  [{}] {:<12} {}",
                load.slot,
                load.name,
                if load.enabled { "on" } else { "off" }
            )?;
        }
        Ok(())
    }
}

fn log_load_issues(loads: &[LoadSpec]) {
    for issue in load_issues(loads) {
        warn!(field = %issue.field, "{}", issue.message);
    }
}

/// Replays JSON-lines messages through an engine.
///
/// Each line is one message object. An optional numeric `atMs` field moves
/// the clock to `start_ms + atMs` before the message is handled; offsets
/// that would move time backwards are ignored. Lines that are not valid
/// JSON are skipped with a warning.
///
/// # Errors
///
/// Returns [`RunError::Input`] if reading from `input` fails.
pub fn replay<S: Sink>(
    loads: &[LoadSpec],
    input: impl BufRead,
    start_ms: u64,
    sink: S,
) -> Result<(RunReport, S), RunError> {
    log_load_issues(loads);
    let clock = ManualClock::new(start_ms);
    let mut host = Host::start(loads, clock.clone(), sink);
    let mut messages = 0;
    let mut skipped = 0;

    for (line_no, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(err) => {
                skipped += 1;
                warn!(line = line_no + 1, error = %err, "skipping malformed input line");
                continue;
            }
        };
        if let Some(offset) = number(value.get("atMs")).filter(|ms| *ms >= 0.0) {
            let at = start_ms.saturating_add(offset as u64);
            if at >= clock.now_ms() {
                clock.set(at);
            }
        }
        host.on_message(&Message::from_value(value));
        messages += 1;
    }

    let faults = host.faults();
    let delivery_failures = host.delivery_failures();
    let (snapshot, sink, journal) = host.stop();
    let report = RunReport {
        snapshot,
        journal: journal.into_entries(),
        messages,
        skipped,
        faults,
        delivery_failures,
        samples: Vec::new(),
    };
    Ok((report, sink))
}

/// Runs the simulated meter through the telemetry node into an engine.
///
/// Time advances from poll to poll on a manual clock, so a run is fully
/// determined by the configuration and seed. Delivered commands switch the
/// simulated appliances, closing the loop between shedding and import.
///
/// # Errors
///
/// Returns [`RunError::Invalid`] if the configuration fails validation.
pub fn simulate<S: Sink>(cfg: &Config, sink: S) -> Result<(RunReport, S), RunError> {
    let errors = cfg.validate();
    if !errors.is_empty() {
        return Err(RunError::Invalid(errors.iter().map(ToString::to_string).collect()));
    }
    log_load_issues(&cfg.loads);

    let sim = &cfg.simulation;
    let clock = ManualClock::new(sim.start_ms);
    let mut host = Host::start(&cfg.loads, clock.clone(), sink);
    let mut node = TelemetryNode::new(&cfg.telemetry, sim.start_ms);
    let mut poller = Poller::new(cfg.telemetry.poll_interval_ms, sim.start_ms);
    let mut meter: Option<SimulatedMeter> = None;
    let mut messages = 0;
    let mut samples = Vec::new();

    info!(
        seed = sim.seed,
        steps = sim.steps,
        interval_ms = poller.interval_ms(),
        "simulation started"
    );

    for _ in 0..sim.steps {
        let now = poller.next_due_ms();
        clock.set(now);
        match poller.action(now) {
            PollAction::Resolve => match &cfg.telemetry.device {
                Some(device) => {
                    info!(device = %device, "meter resolved");
                    meter = Some(SimulatedMeter::new(sim));
                    poller.resolved(now);
                }
                None => {
                    debug!(display = %node.device_missing(), "meter unresolved; retrying");
                    poller.resolve_failed(now);
                }
            },
            PollAction::Read => {
                let Some(m) = meter.as_mut() else {
                    poller.resolve_failed(now);
                    continue;
                };
                while let Some(status) = m.take_status(now) {
                    if let Some(msg) = node.on_device_status(status) {
                        dispatch(&mut host, m, &msg);
                        messages += 1;
                    }
                }

                let result = m.read(now);
                let (import_kw, has_warning) = match &result {
                    Ok(r) => (r.power.import_w.map(|w| w / 1_000.0), r.warning_raised()),
                    Err(_) => (None, false),
                };
                let edge = match node.on_reading(result, now) {
                    Some(msg) => {
                        messages += 1;
                        dispatch(&mut host, m, &msg).is_some_and(|o| o.signal.is_edge())
                    }
                    None => false,
                };
                if cfg.staging.reevaluate_on_poll && !edge {
                    reevaluate(&mut host, m);
                }
                samples.push(PollSample {
                    timestamp_ms: now,
                    import_kw,
                    has_warning,
                    stage: host.engine().stage(),
                });
                poller.polled(now);
            }
            PollAction::Idle => {}
        }
    }

    let faults = host.faults();
    let delivery_failures = host.delivery_failures();
    let (snapshot, sink, journal) = host.stop();
    info!(stage = snapshot.stage, commands = journal.len(), "simulation finished");
    let report = RunReport {
        snapshot,
        journal: journal.into_entries(),
        messages,
        skipped: 0,
        faults,
        delivery_failures,
        samples,
    };
    Ok((report, sink))
}

/// Hands a message to the host and switches appliances for every command
/// the sink accepted.
fn dispatch<S: Sink>(
    host: &mut Host<ManualClock, S>,
    meter: &mut SimulatedMeter,
    message: &Message,
) -> Option<EngineOutput> {
    let before = host.journal().len();
    let output = host.on_message(message);
    apply_delivered(host, meter, before);
    output
}

fn reevaluate<S: Sink>(host: &mut Host<ManualClock, S>, meter: &mut SimulatedMeter) {
    let before = host.journal().len();
    host.reevaluate();
    apply_delivered(host, meter, before);
}

fn apply_delivered<S: Sink>(host: &Host<ManualClock, S>, meter: &mut SimulatedMeter, from: usize) {
    for entry in host.journal().entries().iter().skip(from) {
        if entry.delivered {
            meter.set_load_enabled(&entry.routing_key, entry.value);
        }
    }
}
