//! Record of committed load commands, with CSV export.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::engine::CommandBatch;

/// Schema v1 column header for CSV journal export.
const HEADER: &str = "seq,timestamp_ms,stage,slot,routing_key,value,delivered";

/// One committed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalEntry {
    /// Monotonic sequence number, starting at 0.
    pub seq: usize,
    /// Commit time (ms since epoch).
    pub timestamp_ms: u64,
    /// Stage that produced the command.
    pub stage: usize,
    /// Output position in the load list.
    pub slot: usize,
    pub routing_key: String,
    pub value: bool,
    /// Whether the sink accepted the batch carrying this command.
    pub delivered: bool,
}

/// Append-only command journal.
#[derive(Debug, Default, Clone)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every populated slot of `batch`.
    pub fn record(&mut self, batch: &CommandBatch, timestamp_ms: u64, stage: usize, delivered: bool) {
        for (slot, command) in batch.commands() {
            let seq = self.entries.len();
            self.entries.push(JournalEntry {
                seq,
                timestamp_ms,
                stage,
                slot,
                routing_key: command.routing_key.clone(),
                value: command.value,
                delivered,
            });
        }
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<JournalEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Exports journal entries to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(entries: &[JournalEntry], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(entries, buf)
}

/// Writes journal entries as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(entries: &[JournalEntry], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(','))?;

    for e in entries {
        wtr.write_record(&[
            e.seq.to_string(),
            e.timestamp_ms.to_string(),
            e.stage.to_string(),
            e.slot.to_string(),
            e.routing_key.clone(),
            e.value.to_string(),
            e.delivered.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
