//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::config::RunConfig;
use crate::engine::controller::ControlError;
use crate::engine::RunController;
use crate::types::{LogEvent, LogKind, RunProgress};

/// Events returned by `/api/logs`.
const LOG_PAGE: usize = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub controller: Arc<RunController>,
    /// Run profile used by `POST /api/start`. `None` disables starting.
    pub profile: Option<Arc<RunConfig>>,
}

impl DashboardState {
    pub fn new(controller: Arc<RunController>, profile: Option<Arc<RunConfig>>) -> Self {
        Self {
            controller,
            profile,
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    #[serde(flatten)]
    pub event: LogEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
}

impl From<LogEvent> for LogEntry {
    fn from(event: LogEvent) -> Self {
        let explorer_url = event.explorer_url();
        Self {
            event,
            explorer_url,
        }
    }
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<RunProgress> {
    Json(state.controller.progress())
}

/// GET /api/logs?kind=
pub async fn get_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Response {
    let kind = match query.kind.as_deref().map(str::parse::<LogKind>) {
        None => None,
        Some(Ok(kind)) => Some(kind),
        Some(Err(msg)) => return error_body(StatusCode::BAD_REQUEST, msg),
    };

    let entries: Vec<LogEntry> = state
        .controller
        .events()
        .history(kind, LOG_PAGE)
        .into_iter()
        .map(LogEntry::from)
        .collect();
    Json(entries).into_response()
}

/// POST /api/start
pub async fn start_run(State(state): State<AppState>) -> Response {
    let Some(profile) = state.profile.clone() else {
        return error_body(
            StatusCode::SERVICE_UNAVAILABLE,
            "No run profile loaded",
        );
    };

    match state.controller.start_run(profile).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(state.controller.progress())).into_response(),
        Err(err) if err.downcast_ref::<ControlError>().is_some() => {
            error_body(StatusCode::CONFLICT, err.to_string())
        }
        Err(err) => {
            warn!(error = %err, "Dashboard start failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

/// POST /api/stop
pub async fn stop_run(State(state): State<AppState>) -> StatusCode {
    state.controller.cancel_run().await;
    StatusCode::ACCEPTED
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
