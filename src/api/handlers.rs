//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::AppState;
use super::types::{CommandsQuery, ErrorResponse, StateResponse};
use crate::journal::JournalEntry;

/// Returns the engine state at the end of the run.
///
/// `GET /state` → 200 + `StateResponse` JSON
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    let s = &state.snapshot;
    Json(StateResponse {
        stage: s.stage,
        max_stage: s.max_stage,
        slots: s.slots,
        loads: s.loads.clone(),
        status: s.status.clone(),
        display: s.display.clone(),
        commands: state.journal.len(),
        latest_poll: state.samples.last().cloned(),
    })
}

/// Returns journal entries, optionally filtered by sequence number.
///
/// `GET /commands` → 200 + `Vec<JournalEntry>` JSON
/// `GET /commands?from=N&to=M` → filtered range (inclusive)
/// `GET /commands?from=10&to=5` → 400 + `ErrorResponse`
pub async fn get_commands(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CommandsQuery>,
) -> impl IntoResponse {
    let from = query.from.unwrap_or(0);
    let to = query.to.unwrap_or(usize::MAX);

    if from > to {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("`from` ({from}) must be <= `to` ({to})"),
            }),
        ));
    }

    let entries: Vec<JournalEntry> = state
        .journal
        .iter()
        .filter(|e| e.seq >= from && e.seq <= to)
        .cloned()
        .collect();

    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    use super::*;
    use crate::api::router;
    use crate::engine::{CommandBatch, Engine, LoadCommand, LoadSpec, ManualClock};
    use crate::journal::Journal;
    use crate::signal::ShedSignal;

    fn make_test_state() -> Arc<AppState> {
        let mut engine = Engine::start(
            &[LoadSpec::new("pool", 0.0, 0.0), LoadSpec::new("ev", 0.0, 0.0)],
            ManualClock::new(0),
        );
        engine.handle_signal(ShedSignal::Shed);

        let mut journal = Journal::new();
        for seq in 0..12 {
            let mut batch = CommandBatch::empty(2);
            batch.set(
                seq % 2,
                LoadCommand {
                    routing_key: if seq % 2 == 0 { "pool" } else { "ev" }.to_string(),
                    value: seq % 4 < 2,
                },
            );
            journal.record(&batch, seq as u64 * 1_000, 1, true);
        }

        Arc::new(AppState {
            snapshot: engine.snapshot(),
            journal: journal.into_entries(),
            samples: Vec::new(),
        })
    }

    #[tokio::test]
    async fn state_returns_200() {
        let state = make_test_state();
        let app = router(state);

        let req = Request::builder()
            .uri("/state")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["stage"], 1);
        assert_eq!(json["max_stage"], 2);
        assert_eq!(json["loads"].as_array().map(Vec::len), Some(2));
        assert_eq!(json["display"]["text"], "stage 1/2");
        assert_eq!(json["commands"], 12);
        assert!(json["latest_poll"].is_null());
    }

    #[tokio::test]
    async fn commands_returns_all_entries() {
        let state = make_test_state();
        let app = router(state);

        let req = Request::builder()
            .uri("/commands")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.len(), 12);
    }

    #[tokio::test]
    async fn commands_range_query() {
        let state = make_test_state();
        let app = router(state);

        let req = Request::builder()
            .uri("/commands?from=5&to=10")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.len(), 6); // seq 5,6,7,8,9,10
        assert_eq!(json[0]["seq"], 5);
        assert_eq!(json[5]["seq"], 10);
        assert_eq!(json[0]["routing_key"], "ev");
    }

    #[tokio::test]
    async fn commands_invalid_range_returns_400() {
        let state = make_test_state();
        let app = router(state);

        let req = Request::builder()
            .uri("/commands?from=10&to=5")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json.get("error").is_some());
    }
}
