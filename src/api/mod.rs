//! REST API over the state of a finished run.
//!
//! Provides two GET endpoints:
//! - `/state`: stage, loads, connectivity and status display
//! - `/commands`: the command journal with optional range filtering

mod handlers;
mod types;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::engine::EngineSnapshot;
use crate::journal::JournalEntry;
use crate::runner::{PollSample, RunReport};

pub use types::{CommandsQuery, ErrorResponse, StateResponse};

/// Immutable application state shared across all request handlers.
///
/// Constructed once after the run completes and wrapped in `Arc`; no
/// locks needed since all data is read-only.
pub struct AppState {
    /// Engine state when the run stopped.
    pub snapshot: EngineSnapshot,
    /// Every committed command.
    pub journal: Vec<JournalEntry>,
    /// Per-poll trace of a simulation.
    pub samples: Vec<PollSample>,
}

impl From<RunReport> for AppState {
    fn from(report: RunReport) -> Self {
        Self {
            snapshot: report.snapshot,
            journal: report.journal,
            samples: report.samples,
        }
    }
}

/// Builds the axum router with all API routes.
///
/// # Arguments
///
/// * `state` - Shared application state
///
/// # Returns
///
/// Configured `Router` ready to serve.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/state", get(handlers::get_state))
        .route("/commands", get(handlers::get_commands))
        .with_state(state)
}

/// Binds to the given address and serves the API until the server stops.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind to `addr` or the
/// server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
