//! Core staging types: load descriptors, per-load state, and engine outputs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::signal::ShedSignal;
use crate::status::{ConnectionStatus, StatusDisplay};

/// One entry of the ordered load list.
///
/// Position in the list is the shedding priority (index 0 sheds first).
/// Entries without a name keep their output slot but are never tracked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadSpec {
    /// Identifier and output routing key.
    pub name: Option<String>,
    /// Minimum time the load must stay on before it may be shed (s).
    pub min_on_seconds: f64,
    /// Minimum time the load must stay off before it may be restored (s).
    pub min_off_seconds: f64,
}

impl LoadSpec {
    pub fn new(name: impl Into<String>, min_on_seconds: f64, min_off_seconds: f64) -> Self {
        Self {
            name: Some(name.into()),
            min_on_seconds,
            min_off_seconds,
        }
    }

    /// Placeholder slot with no name.
    pub fn unnamed() -> Self {
        Self::default()
    }

    /// The name, if present and non-empty.
    pub fn tracked_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }
}

/// Mutable state of one tracked load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadState {
    pub enabled: bool,
    /// Time of the last enabled/disabled transition (ms since epoch).
    pub last_change_ms: u64,
}

impl LoadState {
    /// Every load starts enabled, with its dwell timer running from `now_ms`.
    pub fn started_at(now_ms: u64) -> Self {
        Self {
            enabled: true,
            last_change_ms: now_ms,
        }
    }
}

/// A boolean set command for one load output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadCommand {
    pub routing_key: String,
    pub value: bool,
}

impl fmt::Display for LoadCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.routing_key, self.value)
    }
}

/// Positional command batch, one slot per configured load position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CommandBatch {
    slots: Vec<Option<LoadCommand>>,
}

impl CommandBatch {
    /// An all-`null` batch with `len` slots.
    pub fn empty(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    pub fn set(&mut self, slot: usize, command: LoadCommand) {
        if let Some(s) = self.slots.get_mut(slot) {
            *s = Some(command);
        }
    }

    pub fn slots(&self) -> &[Option<LoadCommand>] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// `true` when no slot carries a command.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Populated slots with their positions.
    pub fn commands(&self) -> impl Iterator<Item = (usize, &LoadCommand)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (i, c)))
    }
}

impl fmt::Display for CommandBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .slots
            .iter()
            .map(|s| s.as_ref().map_or_else(|| "-".to_string(), LoadCommand::to_string))
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Everything one input produced.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    /// Signal extracted from the input.
    pub signal: ShedSignal,
    /// Stage after handling the input.
    pub stage: usize,
    /// Commands to deliver; `None` when nothing changed.
    pub batch: Option<CommandBatch>,
    /// Status display update, if the input warranted one.
    pub display: Option<StatusDisplay>,
}

/// Point-in-time view of one configured load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadSnapshot {
    pub slot: usize,
    pub name: String,
    pub enabled: bool,
    pub last_change_ms: u64,
    pub min_on_seconds: f64,
    pub min_off_seconds: f64,
}

/// Point-in-time view of the whole engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub stage: usize,
    pub max_stage: usize,
    pub slots: usize,
    pub loads: Vec<LoadSnapshot>,
    pub status: ConnectionStatus,
    pub display: StatusDisplay,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(key: &str, value: bool) -> LoadCommand {
        LoadCommand {
            routing_key: key.to_string(),
            value,
        }
    }

    #[test]
    fn empty_batch_has_null_slots() {
        let batch = CommandBatch::empty(3);
        assert_eq!(batch.len(), 3);
        assert!(batch.is_empty());
        assert_eq!(serde_json::to_string(&batch).ok().as_deref(), Some("[null,null,null]"));
    }

    #[test]
    fn batch_serializes_positionally() {
        let mut batch = CommandBatch::empty(2);
        batch.set(1, cmd("evcharger", false));
        assert!(!batch.is_empty());
        assert_eq!(
            serde_json::to_string(&batch).ok().as_deref(),
            Some(r#"[null,{"routingKey":"evcharger","value":false}]"#)
        );
        assert_eq!(batch.to_string(), "[-, evcharger=false]");
        let found: Vec<usize> = batch.commands().map(|(i, _)| i).collect();
        assert_eq!(found, vec![1]);
    }

    #[test]
    fn out_of_range_slot_is_ignored() {
        let mut batch = CommandBatch::empty(1);
        batch.set(5, cmd("x", true));
        assert!(batch.is_empty());
    }

    #[test]
    fn empty_names_are_not_tracked() {
        assert_eq!(LoadSpec::new("", 0.0, 0.0).tracked_name(), None);
        assert_eq!(LoadSpec::unnamed().tracked_name(), None);
        assert_eq!(LoadSpec::new("pool", 0.0, 0.0).tracked_name(), Some("pool"));
    }
}
