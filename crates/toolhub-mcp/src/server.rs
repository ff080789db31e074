// crates/toolhub-mcp/src/server.rs
// ============================================================================
// Module: MCP Server
// Description: Stdio and HTTP transports for the Toolhub MCP endpoint.
// Purpose: Frame JSON-RPC traffic, track sessions, and host the management API.
// Dependencies: axum, tokio, toolhub-core
// ============================================================================

//! ## Overview
//! [`McpServer`] emits `server-start`, mirrors telemetry into the diagnostic
//! log, and then serves one transport:
//! - stdio: newline-delimited JSON-RPC on stdin/stdout, one session per
//!   process, disconnected at EOF. The management surface listens on the
//!   configured port alongside it unless disabled.
//! - HTTP: `POST /mcp` carries JSON-RPC, sessions are named by the
//!   `Mcp-Session-Id` header minted on `initialize`, and `DELETE /mcp` ends
//!   one. Management routes share the listener.
//!
//! Tool calls run as independent tasks; any number may be in flight.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderName;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use toolhub_config::ConfigStore;
use toolhub_core::Dispatcher;
use toolhub_core::NewEvent;
use toolhub_core::TelemetryBus;
use toolhub_update::UpdateManager;

use crate::diagnostic::DiagnosticRecord;
use crate::diagnostic::DiagnosticSink;
use crate::diagnostic::attach;
use crate::management;
use crate::rpc::INVALID_REQUEST;
use crate::rpc::JsonRpcError;
use crate::rpc::JsonRpcResponse;
use crate::rpc::RpcHandler;
use crate::rpc::new_session_id;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the HTTP session id.
pub const SESSION_HEADER: &str = "mcp-session-id";
/// Largest accepted JSON-RPC message.
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;
/// Responses buffered for the stdio writer.
const STDIO_RESPONSE_BUFFER: usize = 64;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Protocol transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Newline-delimited JSON-RPC on stdin/stdout.
    Stdio,
    /// JSON-RPC over `POST /mcp`.
    Http,
}

impl Transport {
    /// Returns the transport label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
        }
    }
}

/// Runtime options for [`McpServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOptions {
    /// Protocol transport.
    pub transport: Transport,
    /// Listener address for HTTP and the management surface.
    pub bind: SocketAddr,
    /// Whether the management routes are served.
    pub management: bool,
}

// ============================================================================
// SECTION: Shared State
// ============================================================================

/// Services shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    /// Method router.
    rpc: Arc<RpcHandler>,
    /// Self-update driver, when available.
    updater: Option<Arc<UpdateManager>>,
    /// Diagnostic log.
    diagnostics: Arc<dyn DiagnosticSink>,
    /// Open HTTP sessions.
    http_sessions: Arc<Mutex<BTreeSet<String>>>,
}

impl AppState {
    /// Bundles the services.
    #[must_use]
    pub fn new(
        dispatcher: Dispatcher,
        updater: Option<Arc<UpdateManager>>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            rpc: Arc::new(RpcHandler::new(dispatcher)),
            updater,
            diagnostics,
            http_sessions: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Returns the method router.
    #[must_use]
    pub const fn rpc(&self) -> &Arc<RpcHandler> {
        &self.rpc
    }

    /// Returns the dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        self.rpc.dispatcher()
    }

    /// Returns the telemetry bus.
    #[must_use]
    pub fn bus(&self) -> &TelemetryBus {
        self.dispatcher().bus()
    }

    /// Returns the configuration store.
    #[must_use]
    pub fn config(&self) -> &Arc<ConfigStore> {
        self.dispatcher().config()
    }

    /// Returns the update manager, if any.
    #[must_use]
    pub fn updater(&self) -> Option<&Arc<UpdateManager>> {
        self.updater.as_ref()
    }

    /// Returns the diagnostic sink.
    #[must_use]
    pub const fn diagnostics(&self) -> &Arc<dyn DiagnosticSink> {
        &self.diagnostics
    }

    /// Registers an HTTP session id.
    fn open_session(&self, id: &str) {
        if let Ok(mut sessions) = self.http_sessions.lock() {
            sessions.insert(id.to_string());
        }
    }

    /// Returns true when the HTTP session is open.
    fn has_session(&self, id: &str) -> bool {
        self.http_sessions.lock().is_ok_and(|sessions| sessions.contains(id))
    }

    /// Forgets an HTTP session; false when it was not open.
    fn close_session(&self, id: &str) -> bool {
        self.http_sessions.lock().is_ok_and(|mut sessions| sessions.remove(id))
    }
}

// ============================================================================
// SECTION: MCP Server
// ============================================================================

/// Toolhub MCP server.
pub struct McpServer {
    /// Shared services.
    state: AppState,
    /// Runtime options.
    options: ServerOptions,
}

impl McpServer {
    /// Builds a server.
    #[must_use]
    pub const fn new(state: AppState, options: ServerOptions) -> Self {
        Self {
            state,
            options,
        }
    }

    /// Serves until the transport closes.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the listener cannot bind or the
    /// transport fails.
    pub async fn serve(self) -> Result<(), McpServerError> {
        let _log = attach(self.state.bus(), Arc::clone(self.state.diagnostics()));
        self.state.bus().emit(NewEvent::server_start());
        self.state.diagnostics().record(&DiagnosticRecord::notice_with(
            "server starting",
            json!({
                "version": env!("CARGO_PKG_VERSION"),
                "transport": self.options.transport.as_str(),
                "bind": self.options.bind.to_string(),
                "management": self.options.management,
            }),
        ));
        match self.options.transport {
            Transport::Stdio => {
                if self.options.management {
                    spawn_management(self.state.clone(), self.options.bind).await;
                }
                let stdin = tokio::io::stdin();
                let stdout = tokio::io::stdout();
                serve_stdio(Arc::clone(self.state.rpc()), stdin, stdout).await
            }
            Transport::Http => {
                let bind = self.options.bind;
                let listener = TcpListener::bind(bind).await.map_err(|err| {
                    McpServerError::Transport(format!("http bind {bind} failed: {err}"))
                })?;
                self.state
                    .diagnostics()
                    .record(&DiagnosticRecord::notice(format!("listening on http://{bind}/mcp")));
                serve_http(listener, self.state, self.options.management).await
            }
        }
    }
}

/// Starts the management surface beside the stdio transport.
///
/// A bind failure is logged and leaves stdio serving.
async fn spawn_management(state: AppState, bind: SocketAddr) {
    match TcpListener::bind(bind).await {
        Ok(listener) => {
            state.diagnostics().record(&DiagnosticRecord::notice(format!(
                "management surface listening on http://{bind}"
            )));
            let diagnostics = Arc::clone(state.diagnostics());
            let app = management_router(state);
            tokio::spawn(async move {
                if let Err(err) = axum::serve(listener, app).await {
                    diagnostics.record(&DiagnosticRecord::notice(format!(
                        "management surface stopped: {err}"
                    )));
                }
            });
        }
        Err(err) => state.diagnostics().record(&DiagnosticRecord::notice(format!(
            "management surface unavailable on {bind}: {err}"
        ))),
    }
}

// ============================================================================
// SECTION: Stdio Transport
// ============================================================================

/// Serves newline-delimited JSON-RPC until `reader` reaches EOF.
///
/// # Errors
///
/// Returns [`McpServerError::Transport`] when reading or writing fails.
pub async fn serve_stdio<R, W>(
    rpc: Arc<RpcHandler>,
    reader: R,
    writer: W,
) -> Result<(), McpServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    serve_stdio_bounded(rpc, reader, writer, MAX_MESSAGE_BYTES).await
}

/// Stdio loop with an explicit per-message byte limit.
async fn serve_stdio_bounded<R, W>(
    rpc: Arc<RpcHandler>,
    reader: R,
    writer: W,
    limit: usize,
) -> Result<(), McpServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let session_id = new_session_id("stdio");
    let (tx, rx) = mpsc::channel::<JsonRpcResponse>(STDIO_RESPONSE_BUFFER);
    let writer_task = tokio::spawn(write_responses(writer, rx));
    let mut reader = BufReader::new(reader);
    let read = loop {
        let line = match read_line_bounded(&mut reader, limit).await {
            Ok(StdioLine::Message(line)) => line,
            Ok(StdioLine::Oversized) => {
                let error = JsonRpcError::new(INVALID_REQUEST, "message too large");
                let _ = tx.send(JsonRpcResponse::failure(Value::Null, error)).await;
                continue;
            }
            Ok(StdioLine::Eof) => break Ok(()),
            Err(err) => break Err(McpServerError::Transport(format!("stdio read failed: {err}"))),
        };
        let message = line.trim_ascii();
        if message.is_empty() {
            continue;
        }
        let request = match RpcHandler::parse(message) {
            Ok(request) => request,
            Err(response) => {
                let _ = tx.send(*response).await;
                continue;
            }
        };
        if request.method == "tools/call" {
            let rpc = Arc::clone(&rpc);
            let tx = tx.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                if let Some(response) = rpc.handle(&session_id, request).await {
                    let _ = tx.send(response).await;
                }
            });
        } else if let Some(response) = rpc.handle(&session_id, request).await {
            let _ = tx.send(response).await;
        }
    };
    drop(tx);
    let written = writer_task
        .await
        .map_err(|err| McpServerError::Transport(format!("stdio writer failed: {err}")))?;
    rpc.disconnect(&session_id);
    read.and(written)
}

/// One framed read from the stdio stream.
enum StdioLine {
    /// Complete line, newline included when present.
    Message(Vec<u8>),
    /// Line longer than the limit; its bytes were discarded.
    Oversized,
    /// End of input.
    Eof,
}

/// Reads one newline-terminated message without buffering past `limit`.
async fn read_line_bounded<R>(reader: &mut R, limit: usize) -> std::io::Result<StdioLine>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut line = Vec::new();
    let read = (&mut *reader).take(cap).read_until(b'\n', &mut line).await?;
    if read == 0 {
        return Ok(StdioLine::Eof);
    }
    if line.last() == Some(&b'\n') || line.len() <= limit {
        return Ok(StdioLine::Message(line));
    }
    discard_line(reader).await?;
    Ok(StdioLine::Oversized)
}

/// Skips input up to and including the next newline.
async fn discard_line<R>(reader: &mut R) -> std::io::Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    loop {
        let (consumed, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|byte| *byte == b'\n') {
                Some(index) => (index + 1, true),
                None => (available.len(), false),
            }
        };
        reader.consume(consumed);
        if done {
            return Ok(());
        }
    }
}

/// Writes each response as one line.
async fn write_responses<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<JsonRpcResponse>,
) -> Result<(), McpServerError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut payload = serde_json::to_vec(&response)
            .map_err(|err| McpServerError::Transport(format!("serialization failed: {err}")))?;
        payload.push(b'\n');
        writer
            .write_all(&payload)
            .await
            .map_err(|err| McpServerError::Transport(format!("stdio write failed: {err}")))?;
        writer
            .flush()
            .await
            .map_err(|err| McpServerError::Transport(format!("stdio write failed: {err}")))?;
    }
    Ok(())
}

// ============================================================================
// SECTION: HTTP Transport
// ============================================================================

/// Serves the HTTP transport on an already bound listener.
///
/// # Errors
///
/// Returns [`McpServerError::Transport`] when the server stops with an error.
pub async fn serve_http(
    listener: TcpListener,
    state: AppState,
    management: bool,
) -> Result<(), McpServerError> {
    axum::serve(listener, router(state, management))
        .await
        .map_err(|err| McpServerError::Transport(format!("http server failed: {err}")))
}

/// Builds the HTTP application: `/mcp`, `/health`, and optionally `/api`.
#[must_use]
pub fn router(state: AppState, management: bool) -> Router {
    let mut app = Router::new()
        .route("/mcp", post(handle_mcp_post).delete(handle_mcp_delete))
        .route("/health", get(management::health));
    if management {
        app = app.merge(management::routes());
    }
    app.layer(DefaultBodyLimit::max(MAX_MESSAGE_BYTES)).with_state(state)
}

/// Builds the management-only application used beside stdio.
#[must_use]
pub fn management_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(management::health))
        .merge(management::routes())
        .layer(DefaultBodyLimit::max(MAX_MESSAGE_BYTES))
        .with_state(state)
}

/// `POST /mcp`
async fn handle_mcp_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match RpcHandler::parse(&body) {
        Ok(request) => request,
        Err(response) => return (StatusCode::BAD_REQUEST, Json(*response)).into_response(),
    };
    let header = session_header(&headers);
    let session_id = if request.method == "initialize" {
        match header {
            Some(id) if state.has_session(&id) => id,
            _ => {
                let id = new_session_id("http");
                state.open_session(&id);
                id
            }
        }
    } else {
        match header {
            Some(id) if state.has_session(&id) => id,
            Some(_) => {
                return rpc_rejection(StatusCode::NOT_FOUND, request.id, "unknown session");
            }
            None => {
                return rpc_rejection(
                    StatusCode::BAD_REQUEST,
                    request.id,
                    "missing Mcp-Session-Id header",
                );
            }
        }
    };
    let mut response = match state.rpc().handle(&session_id, request).await {
        Some(reply) => (StatusCode::OK, Json(reply)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    };
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response.headers_mut().insert(HeaderName::from_static(SESSION_HEADER), value);
    }
    response
}

/// `DELETE /mcp`
async fn handle_mcp_delete(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    let Some(id) = session_header(&headers) else {
        return StatusCode::BAD_REQUEST;
    };
    if !state.close_session(&id) {
        return StatusCode::NOT_FOUND;
    }
    state.rpc().disconnect(&id);
    StatusCode::NO_CONTENT
}

/// Reads the session header.
fn session_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// JSON-RPC error body with an HTTP status.
fn rpc_rejection(status: StatusCode, id: Option<Value>, message: &str) -> Response {
    let error = JsonRpcError::new(INVALID_REQUEST, message);
    (status, Json(JsonRpcResponse::failure(id.unwrap_or(Value::Null), error))).into_response()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// MCP server errors.
#[derive(Debug, thiserror::Error)]
pub enum McpServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}
