//! Host adapter: feeds messages to an engine and delivers its outputs.
//!
//! State mutation and delivery are separate steps. The engine commits first;
//! delivery failures are logged and recorded in the journal but never undo
//! what the engine already decided.

use std::panic::{self, AssertUnwindSafe};

use tracing::error;

use crate::engine::{Clock, Engine, EngineOutput, EngineSnapshot, LoadSpec};
use crate::journal::Journal;
use crate::message::Message;
use crate::sink::Sink;
use crate::status::StatusDisplay;

/// An engine bound to its downstream sink.
pub struct Host<C: Clock, S: Sink> {
    engine: Engine<C>,
    sink: S,
    journal: Journal,
    faults: usize,
    delivery_failures: usize,
}

impl<C: Clock, S: Sink> Host<C, S> {
    /// Starts the engine and publishes its initial display.
    ///
    /// An empty load list is not an error: the host keeps running and
    /// shows a persistent degraded display.
    pub fn start(loads: &[LoadSpec], clock: C, sink: S) -> Self {
        let engine = Engine::start(loads, clock);
        let mut host = Self {
            engine,
            sink,
            journal: Journal::new(),
            faults: 0,
            delivery_failures: 0,
        };
        let display = host.engine.display().clone();
        host.publish_status(&display);
        host
    }

    /// Handles one message end to end.
    ///
    /// A panic inside the engine is caught here, reported, and the message
    /// is treated as handled so later input still gets processed.
    pub fn on_message(&mut self, message: &Message) -> Option<EngineOutput> {
        let engine = &mut self.engine;
        let result = panic::catch_unwind(AssertUnwindSafe(|| engine.handle(message)));
        match result {
            Ok(output) => {
                self.deliver(&output);
                Some(output)
            }
            Err(payload) => {
                self.faults += 1;
                error!(context = "input", fault = %panic_text(payload.as_ref()), "input handling failed");
                self.publish_status(&StatusDisplay::error("error"));
                None
            }
        }
    }

    /// Re-applies the current stage and delivers any resulting commands.
    pub fn reevaluate(&mut self) -> EngineOutput {
        let output = self.engine.reevaluate();
        self.deliver(&output);
        output
    }

    fn deliver(&mut self, output: &EngineOutput) {
        if let Some(display) = &output.display {
            self.publish_status(display);
        }
        if let Some(batch) = &output.batch {
            let delivered = match self.sink.send_batch(batch) {
                Ok(()) => true,
                Err(err) => {
                    self.delivery_failures += 1;
                    error!(context = "send", stage = output.stage, error = %err, "command delivery failed");
                    false
                }
            };
            let now_ms = self.engine.clock().now_ms();
            self.journal.record(batch, now_ms, output.stage, delivered);
        }
    }

    fn publish_status(&mut self, display: &StatusDisplay) {
        if let Err(err) = self.sink.send_status(display) {
            self.delivery_failures += 1;
            error!(context = "status", error = %err, "status delivery failed");
        }
    }

    pub fn engine(&self) -> &Engine<C> {
        &self.engine
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Inputs whose handling panicked.
    pub fn faults(&self) -> usize {
        self.faults
    }

    /// Batches or displays the sink refused.
    pub fn delivery_failures(&self) -> usize {
        self.delivery_failures
    }

    /// Stops the engine, returning the sink and the journal.
    pub fn stop(self) -> (EngineSnapshot, S, Journal) {
        (self.engine.stop(), self.sink, self.journal)
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
