//! Staging engine that turns shed signals into load commands.

use tracing::{debug, info, warn};

use crate::message::Message;
use crate::signal::ShedSignal;
use crate::status::{ConnectionStatus, StatusDisplay};

use super::clock::Clock;
use super::state::EngineState;
use super::types::{EngineOutput, EngineSnapshot, LoadSpec};

/// Status text while no load is configured.
pub const NO_LOADS_TEXT: &str = "no loads configured";

/// Load-shedding staging engine.
///
/// Generic over `C: Clock` so simulations and tests can drive time by hand.
/// Inputs are processed one at a time to completion; the engine performs
/// no I/O and never blocks.
pub struct Engine<C: Clock> {
    clock: C,
    state: EngineState,
    status: ConnectionStatus,
    display: StatusDisplay,
    /// Set when there is nothing to shed; pins the display to an error.
    degraded: bool,
}

impl<C: Clock> Engine<C> {
    /// Starts an engine over the ordered load list.
    ///
    /// Every tracked load begins enabled with its dwell timer starting now,
    /// so minimum on/off times hold right after a restart.
    ///
    /// # Arguments
    ///
    /// * `loads` - Load list in shedding priority order
    /// * `clock` - Time source for dwell bookkeeping
    pub fn start(loads: &[LoadSpec], clock: C) -> Self {
        let now_ms = clock.now_ms();
        let state = EngineState::new(loads, now_ms);
        let degraded = state.max_stage() == 0;
        let display = if degraded {
            warn!(slots = state.slots(), "no named loads configured; nothing will be shed");
            StatusDisplay::error(NO_LOADS_TEXT)
        } else {
            StatusDisplay::idle(state.stage(), state.max_stage())
        };
        info!(
            slots = state.slots(),
            tracked = state.max_stage(),
            "load-shedding engine started"
        );
        Self {
            clock,
            state,
            status: ConnectionStatus::disconnected(None, now_ms),
            display,
            degraded,
        }
    }

    /// Handles one input message.
    ///
    /// A status object updates the connectivity snapshot. A shed/unshed
    /// signal moves the stage by one and re-evaluates every load. Messages
    /// without a signal change nothing else.
    pub fn handle(&mut self, message: &Message) -> EngineOutput {
        let now_ms = self.clock.now_ms();
        if let Some(status) = message.status_object() {
            self.status = ConnectionStatus::from_value(status, now_ms);
        }

        let signal = message.signal();
        if !signal.is_edge() {
            return EngineOutput {
                signal,
                stage: self.state.stage(),
                batch: None,
                display: None,
            };
        }
        self.apply(signal, now_ms)
    }

    /// Handles a bare signal, bypassing message parsing.
    pub fn handle_signal(&mut self, signal: ShedSignal) -> EngineOutput {
        let now_ms = self.clock.now_ms();
        if !signal.is_edge() {
            return EngineOutput {
                signal,
                stage: self.state.stage(),
                batch: None,
                display: None,
            };
        }
        self.apply(signal, now_ms)
    }

    /// Re-applies the current stage without moving it.
    ///
    /// Lets a caller retry toggles deferred by dwell time without waiting
    /// for the next signal edge.
    pub fn reevaluate(&mut self) -> EngineOutput {
        let now_ms = self.clock.now_ms();
        let batch = self.state.commit(now_ms);
        EngineOutput {
            signal: ShedSignal::Hold,
            stage: self.state.stage(),
            batch: (!batch.is_empty()).then_some(batch),
            display: None,
        }
    }

    fn apply(&mut self, signal: ShedSignal, now_ms: u64) -> EngineOutput {
        let previous = self.state.stage();
        let stage = self.state.apply_signal(signal);
        if stage != previous {
            info!(%signal, from = previous, to = stage, "stage changed");
        } else {
            debug!(%signal, stage, "stage saturated");
        }

        if !self.degraded {
            self.display = StatusDisplay::for_stage(&self.status, stage, self.state.max_stage());
        }
        let batch = self.state.commit(now_ms);

        EngineOutput {
            signal,
            stage,
            batch: (!batch.is_empty()).then_some(batch),
            display: Some(self.display.clone()),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// `true` when no load is configured.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn stage(&self) -> usize {
        self.state.stage()
    }

    pub fn max_stage(&self) -> usize {
        self.state.max_stage()
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn display(&self) -> &StatusDisplay {
        &self.display
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            stage: self.state.stage(),
            max_stage: self.state.max_stage(),
            slots: self.state.slots(),
            loads: self.state.load_snapshots(),
            status: self.status.clone(),
            display: self.display.clone(),
        }
    }

    /// Stops the engine and hands back its final state.
    pub fn stop(self) -> EngineSnapshot {
        let snapshot = self.snapshot();
        info!(stage = snapshot.stage, "load-shedding engine stopped");
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::engine::clock::ManualClock;
    use crate::engine::types::LoadCommand;
    use crate::status::Fill;

    fn warning(flag: bool) -> Message {
        Message::new("t", json!({ "cutoff": { "hasWarning": flag } }))
    }

    fn cmd(key: &str, value: bool) -> Option<LoadCommand> {
        Some(LoadCommand {
            routing_key: key.to_string(),
            value,
        })
    }

    #[test]
    fn worked_example_pool_and_evcharger() {
        let loads = vec![
            LoadSpec::new("pool", 0.0, 0.0),
            LoadSpec::new("evcharger", 0.0, 0.0),
        ];
        let mut engine = Engine::start(&loads, ManualClock::new(0));

        let out = engine.handle(&warning(true));
        assert_eq!(out.stage, 1);
        let batch = out.batch.expect("expected a batch");
        assert_eq!(batch.slots(), &[cmd("pool", false), None]);

        let out = engine.handle(&warning(true));
        assert_eq!(out.stage, 2);
        let batch = out.batch.expect("expected a batch");
        assert_eq!(batch.slots(), &[None, cmd("evcharger", false)]);

        let out = engine.handle(&warning(false));
        assert_eq!(out.stage, 1);
        let batch = out.batch.expect("expected a batch");
        assert_eq!(batch.slots(), &[None, cmd("evcharger", true)]);
    }

    #[test]
    fn hold_messages_change_nothing() {
        let mut engine = Engine::start(&[LoadSpec::new("a", 0.0, 0.0)], ManualClock::new(0));
        let out = engine.handle(&Message::new("t", json!({ "power": {} })));
        assert_eq!(out.signal, ShedSignal::Hold);
        assert!(out.batch.is_none());
        assert!(out.display.is_none());
        assert_eq!(engine.display().fill, Fill::Grey);
    }

    #[test]
    fn status_only_message_updates_connectivity() {
        let mut engine = Engine::start(&[LoadSpec::new("a", 0.0, 0.0)], ManualClock::new(0));
        let msg = Message::default().with_status(json!({ "connected": true }));
        engine.handle(&msg);
        assert!(engine.status().connected);

        let out = engine.handle(&warning(false));
        let display = out.display.expect("expected a display");
        assert_eq!(display.fill, Fill::Green);
        assert_eq!(display.text, "stage 0/1");
    }

    #[test]
    fn reevaluate_applies_deferred_toggles() {
        let clock = ManualClock::new(0);
        let mut engine = Engine::start(&[LoadSpec::new("a", 60.0, 0.0)], clock.clone());
        assert!(engine.handle_signal(ShedSignal::Shed).batch.is_none());
        assert!(engine.reevaluate().batch.is_none());
        clock.advance(Duration::from_secs(60));
        let out = engine.reevaluate();
        assert_eq!(out.stage, 1);
        assert!(out.batch.is_some());
    }

    #[test]
    fn empty_configuration_pins_error_display() {
        let mut engine = Engine::start(&[LoadSpec::unnamed()], ManualClock::new(0));
        assert!(engine.is_degraded());
        let out = engine.handle_signal(ShedSignal::Shed);
        assert_eq!(out.stage, 0);
        assert!(out.batch.is_none());
        let display = out.display.expect("expected a display");
        assert!(display.is_error());
        assert_eq!(display.text, NO_LOADS_TEXT);
    }

    #[test]
    fn stop_returns_final_snapshot() {
        let mut engine = Engine::start(&[LoadSpec::new("a", 0.0, 0.0)], ManualClock::new(3));
        engine.handle_signal(ShedSignal::Shed);
        let snap = engine.stop();
        assert_eq!(snap.stage, 1);
        assert_eq!(snap.loads.len(), 1);
        assert!(!snap.loads[0].enabled);
        assert_eq!(snap.loads[0].last_change_ms, 3);
    }
}
