// crates/toolhub-mcp/src/management.rs
// ============================================================================
// Module: Management Surface
// Description: REST and SSE routes for tools, configuration, and telemetry.
// Purpose: Back the dashboard and scripts with the same state the MCP side uses.
// Dependencies: axum, tokio-stream, toolhub-core, toolhub-update
// ============================================================================

//! ## Overview
//! Routes under `/api` read and change the live server state:
//! - tool and group listings resolved against the current configuration
//! - explicit tool overrides and configuration merges, persisted through the
//!   config store and visible to the next `tools/list`
//! - telemetry aggregates, sessions, timeseries, and an SSE event feed that
//!   replays recent history before following new events
//! - update check and apply, reporting every phase
//!
//! Errors are JSON bodies of the form `{ "error": "..." }`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::response::sse::Event as SseEvent;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use toolhub_config::ConfigError;
use toolhub_core::GroupDescriptor;
use toolhub_core::ToolStatus;
use toolhub_core::tool_statuses;
use toolhub_update::UpdateError;
use toolhub_update::UpdateManager;

use crate::diagnostic::DiagnosticRecord;
use crate::server::AppState;
use crate::tools::PhaseTranscript;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Frames buffered per SSE connection.
const SSE_BUFFER: usize = 64;

// ============================================================================
// SECTION: Routes
// ============================================================================

/// Builds the `/api` routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/tools", get(list_tools))
        .route("/api/tools/{name}/toggle", post(toggle_tool))
        .route("/api/groups", get(list_groups))
        .route("/api/config", get(show_config).put(merge_config))
        .route("/api/stats", get(stats))
        .route("/api/sessions", get(sessions))
        .route("/api/timeseries", get(timeseries))
        .route("/api/events", get(events))
        .route("/api/update", get(check_update).post(apply_update))
}

/// `GET /health`
pub(crate) async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

// ============================================================================
// SECTION: Payloads
// ============================================================================

/// `POST /api/tools/{name}/toggle` body.
#[derive(Debug, Deserialize)]
struct ToggleRequest {
    /// New override; `null` clears it.
    #[serde(default)]
    enabled: Option<bool>,
}

/// `GET /api/timeseries` query.
#[derive(Debug, Deserialize)]
struct TimeseriesQuery {
    /// Bucket width; raw samples when absent.
    bucket_ms: Option<u64>,
}

/// Group with its member tools.
#[derive(Debug, Serialize)]
struct GroupView<'a> {
    /// Group descriptor.
    #[serde(flatten)]
    group: &'a GroupDescriptor,
    /// Member tool names.
    tools: Vec<&'a str>,
    /// Members currently enabled.
    enabled_count: usize,
}

// ============================================================================
// SECTION: Tools
// ============================================================================

/// `GET /api/tools`
async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolStatus>> {
    let config = state.config().snapshot();
    Json(tool_statuses(state.dispatcher().catalog(), &config))
}

/// `POST /api/tools/{name}/toggle`
async fn toggle_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<ToggleRequest>,
) -> Result<Json<ToolStatus>, ApiError> {
    if state.dispatcher().catalog().tool(&name).is_none() {
        return Err(ApiError::NotFound(format!("unknown tool: {name}")));
    }
    let config = state.config().set_tool_override(&name, request.enabled)?;
    state.diagnostics().record(&DiagnosticRecord::notice_with(
        "tool override changed",
        json!({ "tool": name, "enabled": request.enabled }),
    ));
    tool_statuses(state.dispatcher().catalog(), &config)
        .into_iter()
        .find(|status| status.name == name)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("unknown tool: {name}")))
}

/// `GET /api/groups`
async fn list_groups(State(state): State<AppState>) -> Json<Value> {
    let catalog = state.dispatcher().catalog();
    let config = state.config().snapshot();
    let views: Vec<GroupView<'_>> = catalog
        .groups()
        .iter()
        .map(|group| {
            let members: Vec<_> = catalog.tools_in_group(&group.id).collect();
            GroupView {
                group,
                enabled_count: members
                    .iter()
                    .filter(|tool| catalog.is_enabled(tool, &config))
                    .count(),
                tools: members.iter().map(|tool| tool.name.as_str()).collect(),
            }
        })
        .collect();
    Json(serde_json::to_value(views).unwrap_or(Value::Null))
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// `GET /api/config`
async fn show_config(State(state): State<AppState>) -> Json<Value> {
    Json(state.config().redacted())
}

/// `PUT /api/config`
async fn merge_config(
    State(state): State<AppState>,
    Json(patch): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    if !patch.is_object() {
        return Err(ApiError::BadRequest("config patch must be an object".to_string()));
    }
    let config = state.config().merge(&patch)?;
    state.diagnostics().record(&DiagnosticRecord::notice("configuration merged"));
    Ok(Json(config.redacted()))
}

// ============================================================================
// SECTION: Telemetry
// ============================================================================

/// `GET /api/stats`
async fn stats(State(state): State<AppState>) -> Response {
    Json(state.bus().stats()).into_response()
}

/// `GET /api/sessions`
async fn sessions(State(state): State<AppState>) -> Response {
    Json(state.bus().sessions()).into_response()
}

/// `GET /api/timeseries`
async fn timeseries(
    State(state): State<AppState>,
    Query(query): Query<TimeseriesQuery>,
) -> Result<Response, ApiError> {
    match query.bucket_ms {
        None => Ok(Json(state.bus().timeseries()).into_response()),
        Some(0) => Err(ApiError::BadRequest("bucket_ms must be positive".to_string())),
        Some(bucket_ms) => Ok(Json(state.bus().timeseries_buckets(bucket_ms)).into_response()),
    }
}

/// `GET /api/events`: recent history, then live events.
async fn events(State(state): State<AppState>) -> impl IntoResponse {
    let stream = state.bus().live_stream();
    let (tx, rx) = mpsc::channel::<Result<SseEvent, Infallible>>(SSE_BUFFER);
    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                event = stream.recv() => event,
                () = tx.closed() => None,
            };
            let Some(event) = next else {
                break;
            };
            let Ok(data) = serde_json::to_string(event.as_ref()) else {
                continue;
            };
            let frame =
                SseEvent::default().event(event.kind.as_str()).id(event.id.to_string()).data(data);
            if tx.send(Ok(frame)).await.is_err() {
                break;
            }
        }
    });
    Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}

// ============================================================================
// SECTION: Update
// ============================================================================

/// `GET /api/update`
async fn check_update(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let updater = require_updater(&state)?;
    let transcript = PhaseTranscript::default();
    let check = updater.check(&transcript).await?;
    Ok(Json(json!({ "check": check, "phases": transcript.entries() })))
}

/// `POST /api/update`
async fn apply_update(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let updater = require_updater(&state)?;
    let transcript = PhaseTranscript::default();
    let result = updater.update(&transcript).await;
    state.diagnostics().record(&DiagnosticRecord::notice_with(
        "self-update finished",
        json!({ "ok": result.is_ok(), "phases": transcript.entries() }),
    ));
    let outcome = result?;
    Ok(Json(json!({ "outcome": outcome, "phases": transcript.entries() })))
}

/// Returns the update manager or a 503.
fn require_updater(state: &AppState) -> Result<&UpdateManager, ApiError> {
    state
        .updater()
        .map(Arc::as_ref)
        .ok_or_else(|| ApiError::Unavailable("self-update is unavailable".to_string()))
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Management request failures.
#[derive(Debug, thiserror::Error)]
enum ApiError {
    /// Unknown resource.
    #[error("{0}")]
    NotFound(String),
    /// Malformed request.
    #[error("{0}")]
    BadRequest(String),
    /// Conflicting operation in progress.
    #[error("{0}")]
    Conflict(String),
    /// Capability not configured.
    #[error("{0}")]
    Unavailable(String),
    /// Server-side failure.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for the error.
    const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Invalid(_) | ConfigError::Parse(_) => Self::BadRequest(err.to_string()),
            ConfigError::Io(_) | ConfigError::Serialize(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<UpdateError> for ApiError {
    fn from(err: UpdateError) -> Self {
        match err {
            UpdateError::InProgress => Self::Conflict(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}
