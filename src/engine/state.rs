//! Stage arithmetic, desired-state computation and the commit step.

use std::collections::HashSet;

use tracing::debug;

use crate::signal::ShedSignal;

use super::dwell::DwellPolicy;
use super::types::{CommandBatch, LoadCommand, LoadSnapshot, LoadSpec, LoadState};

/// A load that owns state: the first occurrence of a non-empty name.
#[derive(Debug, Clone)]
struct TrackedLoad {
    slot: usize,
    spec: LoadSpec,
    name: String,
    policy: DwellPolicy,
    state: LoadState,
}

/// Shedding stage plus the state of every tracked load.
///
/// Owned by exactly one engine; nothing else mutates it.
#[derive(Debug, Clone)]
pub struct EngineState {
    stage: usize,
    slots: usize,
    /// Tracked loads in priority order.
    loads: Vec<TrackedLoad>,
}

impl EngineState {
    /// Builds the initial state: stage 0, every load enabled since `now_ms`.
    ///
    /// Duplicate and unnamed entries keep their slot but get no state.
    pub fn new(specs: &[LoadSpec], now_ms: u64) -> Self {
        let mut seen = HashSet::new();
        let loads = specs
            .iter()
            .enumerate()
            .filter_map(|(slot, spec)| {
                let name = spec.tracked_name()?;
                if !seen.insert(name.to_string()) {
                    return None;
                }
                Some(TrackedLoad {
                    slot,
                    spec: spec.clone(),
                    name: name.to_string(),
                    policy: DwellPolicy::from_spec(spec),
                    state: LoadState::started_at(now_ms),
                })
            })
            .collect();

        Self {
            stage: 0,
            slots: specs.len(),
            loads,
        }
    }

    pub fn stage(&self) -> usize {
        self.stage
    }

    /// Number of tracked loads, which is also the highest reachable stage.
    pub fn max_stage(&self) -> usize {
        self.loads.len()
    }

    /// Number of output positions (configured entries, tracked or not).
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Moves the stage one step in the signalled direction, saturating.
    ///
    /// Returns the new stage.
    pub fn apply_signal(&mut self, signal: ShedSignal) -> usize {
        self.stage = match signal {
            ShedSignal::Shed => (self.stage + 1).min(self.max_stage()),
            ShedSignal::Unshed => self.stage.saturating_sub(1),
            ShedSignal::Hold => self.stage,
        };
        self.stage
    }

    /// Desired `enabled` flag of each tracked load for `stage`.
    ///
    /// The first `stage` loads in priority order are disabled.
    pub fn desired_enabled(&self, stage: usize) -> Vec<(&str, bool)> {
        let stage = stage.min(self.max_stage());
        self.loads
            .iter()
            .enumerate()
            .map(|(rank, load)| (load.name.as_str(), rank >= stage))
            .collect()
    }

    /// Applies the current stage to every load the dwell guard allows.
    ///
    /// Blocked toggles are left for a later evaluation; the stage itself is
    /// never rolled back. The returned batch may be empty.
    pub fn commit(&mut self, now_ms: u64) -> CommandBatch {
        let mut batch = CommandBatch::empty(self.slots);
        let stage = self.stage;

        for (rank, load) in self.loads.iter_mut().enumerate() {
            let wanted = rank >= stage;
            if load.state.enabled == wanted {
                continue;
            }
            if !load.policy.permits(&load.state, wanted, now_ms) {
                debug!(
                    load = %load.name,
                    wanted,
                    remaining_ms = load.policy.remaining(&load.state, wanted, now_ms).as_millis() as u64,
                    "toggle deferred by dwell time"
                );
                continue;
            }
            load.state = LoadState {
                enabled: wanted,
                last_change_ms: now_ms,
            };
            batch.set(
                load.slot,
                LoadCommand {
                    routing_key: load.name.clone(),
                    value: wanted,
                },
            );
        }

        batch
    }

    /// State of a tracked load by name.
    pub fn load(&self, name: &str) -> Option<&LoadState> {
        self.loads.iter().find(|l| l.name == name).map(|l| &l.state)
    }

    /// Snapshot of every tracked load in priority order.
    pub fn load_snapshots(&self) -> Vec<LoadSnapshot> {
        self.loads
            .iter()
            .map(|l| LoadSnapshot {
                slot: l.slot,
                name: l.name.clone(),
                enabled: l.state.enabled,
                last_change_ms: l.state.last_change_ms,
                min_on_seconds: l.spec.min_on_seconds,
                min_off_seconds: l.spec.min_off_seconds,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(names: &[&str]) -> Vec<LoadSpec> {
        names.iter().map(|n| LoadSpec::new(*n, 0.0, 0.0)).collect()
    }

    #[test]
    fn starts_at_stage_zero_all_enabled() {
        let state = EngineState::new(&specs(&["a", "b"]), 500);
        assert_eq!(state.stage(), 0);
        assert_eq!(state.max_stage(), 2);
        assert_eq!(
            state.load("a"),
            Some(&LoadState {
                enabled: true,
                last_change_ms: 500
            })
        );
    }

    #[test]
    fn duplicates_and_unnamed_keep_slots_only() {
        let mut list = specs(&["a", "a", "b"]);
        list.insert(1, LoadSpec::unnamed());
        let state = EngineState::new(&list, 0);
        assert_eq!(state.slots(), 4);
        assert_eq!(state.max_stage(), 2);
        let slots: Vec<usize> = state.load_snapshots().iter().map(|l| l.slot).collect();
        assert_eq!(slots, vec![0, 3]);
    }

    #[test]
    fn stage_saturates_in_both_directions() {
        let mut state = EngineState::new(&specs(&["a", "b"]), 0);
        assert_eq!(state.apply_signal(ShedSignal::Unshed), 0);
        assert_eq!(state.apply_signal(ShedSignal::Shed), 1);
        assert_eq!(state.apply_signal(ShedSignal::Shed), 2);
        assert_eq!(state.apply_signal(ShedSignal::Shed), 2);
        assert_eq!(state.apply_signal(ShedSignal::Hold), 2);
        assert_eq!(state.apply_signal(ShedSignal::Unshed), 1);
    }

    #[test]
    fn desired_state_follows_priority() {
        let state = EngineState::new(&specs(&["a", "b", "c"]), 0);
        assert_eq!(
            state.desired_enabled(2),
            vec![("a", false), ("b", false), ("c", true)]
        );
        assert_eq!(
            state.desired_enabled(9),
            vec![("a", false), ("b", false), ("c", false)]
        );
    }

    #[test]
    fn commit_is_idempotent() {
        let mut state = EngineState::new(&specs(&["a", "b"]), 0);
        state.apply_signal(ShedSignal::Shed);
        assert!(!state.commit(1).is_empty());
        assert!(state.commit(2).is_empty());
    }

    #[test]
    fn blocked_toggle_keeps_stage_and_state() {
        let mut state = EngineState::new(&[LoadSpec::new("a", 60.0, 0.0)], 0);
        state.apply_signal(ShedSignal::Shed);
        assert!(state.commit(10_000).is_empty());
        assert_eq!(state.stage(), 1);
        assert_eq!(state.load("a").map(|s| s.enabled), Some(true));

        let batch = state.commit(60_000);
        assert_eq!(batch.commands().count(), 1);
        assert_eq!(
            state.load("a"),
            Some(&LoadState {
                enabled: false,
                last_change_ms: 60_000
            })
        );
    }

    #[test]
    fn no_loads_means_no_stage_and_no_commands() {
        let mut state = EngineState::new(&[], 0);
        assert_eq!(state.apply_signal(ShedSignal::Shed), 0);
        let batch = state.commit(0);
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
    }
}
