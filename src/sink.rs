//! Downstream delivery boundary for command batches and status displays.

use std::io::{self, Write};

use serde::Serialize;
use thiserror::Error;

use crate::engine::CommandBatch;
use crate::status::StatusDisplay;

/// Failure to hand an output to the downstream layer.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("sink I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("cannot encode output: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("sink is closed")]
    Closed,
}

/// Receiver of engine outputs.
///
/// Delivery is fire-and-forget from the engine's point of view: an error
/// is reported by the caller but never undoes committed state.
pub trait Sink {
    fn send_batch(&mut self, batch: &CommandBatch) -> Result<(), DeliveryError>;

    fn send_status(&mut self, display: &StatusDisplay) -> Result<(), DeliveryError>;
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Line<'a> {
    Commands { batch: &'a CommandBatch },
    Status(&'a StatusDisplay),
}

/// Writes every output as one JSON object per line.
///
/// ```text
/// {"type":"status","fill":"yellow","shape":"dot","text":"stage 1/2"}
/// {"type":"commands","batch":[{"routingKey":"pool","value":false},null]}
/// ```
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, line: &Line<'_>) -> Result<(), DeliveryError> {
        serde_json::to_writer(&mut self.writer, line)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> Sink for JsonLinesSink<W> {
    fn send_batch(&mut self, batch: &CommandBatch) -> Result<(), DeliveryError> {
        self.write_line(&Line::Commands { batch })
    }

    fn send_status(&mut self, display: &StatusDisplay) -> Result<(), DeliveryError> {
        self.write_line(&Line::Status(display))
    }
}

/// One output captured by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Batch(CommandBatch),
    Status(StatusDisplay),
}

/// Keeps every output in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub outputs: Vec<Recorded>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> impl Iterator<Item = &CommandBatch> {
        self.outputs.iter().filter_map(|o| match o {
            Recorded::Batch(b) => Some(b),
            Recorded::Status(_) => None,
        })
    }

    pub fn statuses(&self) -> impl Iterator<Item = &StatusDisplay> {
        self.outputs.iter().filter_map(|o| match o {
            Recorded::Status(s) => Some(s),
            Recorded::Batch(_) => None,
        })
    }
}

impl Sink for RecordingSink {
    fn send_batch(&mut self, batch: &CommandBatch) -> Result<(), DeliveryError> {
        self.outputs.push(Recorded::Batch(batch.clone()));
        Ok(())
    }

    fn send_status(&mut self, display: &StatusDisplay) -> Result<(), DeliveryError> {
        self.outputs.push(Recorded::Status(display.clone()));
        Ok(())
    }
}
