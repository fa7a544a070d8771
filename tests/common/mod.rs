//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use serde_json::json;

use loadshed::engine::{Engine, EngineOutput, LoadSpec, ManualClock};
use loadshed::message::{Message, TOPIC_TELEMETRY};

/// Fixed start time (2024-06-01T00:00:00Z).
pub const START_MS: u64 = 1_717_200_000_000;

/// Load list with the given names and dwell times in seconds.
pub fn loads(entries: &[(&str, f64, f64)]) -> Vec<LoadSpec> {
    entries
        .iter()
        .map(|(name, on, off)| LoadSpec::new(*name, *on, *off))
        .collect()
}

/// The two-load list from the worked example, without dwell times.
pub fn pool_and_evcharger() -> Vec<LoadSpec> {
    loads(&[("pool", 0.0, 0.0), ("evcharger", 0.0, 0.0)])
}

/// Starts an engine on a manual clock and returns a handle to that clock.
pub fn engine(specs: &[LoadSpec]) -> (Engine<ManualClock>, ManualClock) {
    let clock = ManualClock::new(START_MS);
    (Engine::start(specs, clock.clone()), clock)
}

/// Telemetry message whose payload carries the given warning flag.
pub fn warning(flag: bool) -> Message {
    Message::new(TOPIC_TELEMETRY, json!({ "cutoff": { "hasWarning": flag } }))
}

/// Positional view of an output batch: `None` for empty slots.
pub fn slots(output: &EngineOutput) -> Vec<Option<(String, bool)>> {
    output
        .batch
        .as_ref()
        .map(|b| {
            b.slots()
                .iter()
                .map(|s| s.as_ref().map(|c| (c.routing_key.clone(), c.value)))
                .collect()
        })
        .unwrap_or_default()
}

pub fn cmd(key: &str, value: bool) -> Option<(String, bool)> {
    Some((key.to_string(), value))
}
