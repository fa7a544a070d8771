//! API response and query types.
//!
//! Command records reuse the CSV journal field names so both export
//! formats agree.

use serde::{Deserialize, Serialize};

use crate::engine::types::LoadSnapshot;
use crate::runner::PollSample;
use crate::status::{ConnectionStatus, StatusDisplay};

/// Engine state response.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub stage: usize,
    pub max_stage: usize,
    /// Configured output positions, tracked or not.
    pub slots: usize,
    /// Tracked loads in priority order.
    pub loads: Vec<LoadSnapshot>,
    /// Last known upstream connectivity.
    pub status: ConnectionStatus,
    pub display: StatusDisplay,
    /// Number of journal entries.
    pub commands: usize,
    /// Most recent poll of a simulation, if any.
    pub latest_poll: Option<PollSample>,
}

/// Optional range query parameters for the commands endpoint.
#[derive(Debug, Deserialize)]
pub struct CommandsQuery {
    /// First sequence number (inclusive).
    pub from: Option<usize>,
    /// Last sequence number (inclusive).
    pub to: Option<usize>,
}

/// Error response body for 400-class errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
