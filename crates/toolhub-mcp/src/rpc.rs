// crates/toolhub-mcp/src/rpc.rs
// ============================================================================
// Module: JSON-RPC Handling
// Description: MCP method routing shared by the stdio and HTTP transports.
// Purpose: Turn JSON-RPC messages into dispatcher calls and session events.
// Dependencies: serde, toolhub-core
// ============================================================================

//! ## Overview
//! [`RpcHandler`] implements the MCP methods Toolhub serves: `initialize`,
//! `notifications/initialized`, `ping`, `tools/list`, and `tools/call`.
//! Transports own framing and session ids; this module owns the method table.
//!
//! ## Invariants
//! - `tools/list` is resolved against the configuration at request time.
//! - Notifications (requests without an id) never produce a response.
//! - Tool failures are results flagged `isError`, never JSON-RPC errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use toolhub_core::Dispatcher;
use toolhub_core::NewEvent;
use toolhub_core::ToolDescriptor;
use toolhub_core::time::now_ms;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// JSON-RPC protocol version.
pub const JSONRPC_VERSION: &str = "2.0";
/// Newest MCP protocol revision spoken by the server.
pub const PROTOCOL_VERSION: &str = "2025-06-18";
/// MCP revisions the server accepts from clients.
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2024-11-05", "2025-03-26", PROTOCOL_VERSION];
/// Server name reported by `initialize`.
pub const SERVER_NAME: &str = "toolhub";
/// Invalid JSON.
pub const PARSE_ERROR: i64 = -32700;
/// Not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// Unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Bad method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Server-side failure.
pub const INTERNAL_ERROR: i64 = -32603;

/// Counter mixed into session ids.
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Incoming JSON-RPC message.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version; must be `2.0`.
    #[serde(default)]
    pub jsonrpc: String,
    /// Request id; absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Returns true when no response is expected.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Outgoing JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version.
    pub jsonrpc: String,
    /// Id of the request answered.
    pub id: Value,
    /// Success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Successful response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Error response.
    #[must_use]
    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
}

impl JsonRpcError {
    /// Builds an error object.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// `tools/call` parameters.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    /// Tool name.
    name: String,
    /// Tool arguments.
    #[serde(default)]
    arguments: Option<Value>,
}

/// Tool entry in `tools/list`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolListing<'a> {
    /// Tool name.
    name: &'a str,
    /// Display title.
    title: &'a str,
    /// Description.
    description: &'a str,
    /// Parameter schema.
    input_schema: &'a Value,
}

impl<'a> From<&'a ToolDescriptor> for ToolListing<'a> {
    fn from(tool: &'a ToolDescriptor) -> Self {
        Self {
            name: &tool.name,
            title: &tool.title,
            description: &tool.description,
            input_schema: &tool.input_schema,
        }
    }
}

// ============================================================================
// SECTION: Handler
// ============================================================================

/// Routes MCP methods to the dispatcher.
#[derive(Clone)]
pub struct RpcHandler {
    /// Tool dispatcher.
    dispatcher: Dispatcher,
}

impl RpcHandler {
    /// Wraps a dispatcher.
    #[must_use]
    pub const fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
        }
    }

    /// Returns the dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Parses one message.
    ///
    /// # Errors
    ///
    /// Returns the error response to send when the bytes are not a JSON-RPC
    /// request.
    pub fn parse(bytes: &[u8]) -> Result<JsonRpcRequest, Box<JsonRpcResponse>> {
        let value: Value = serde_json::from_slice(bytes).map_err(|err| {
            Box::new(JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError::new(PARSE_ERROR, format!("parse error: {err}")),
            ))
        })?;
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|_| {
            Box::new(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(INVALID_REQUEST, "invalid json-rpc request"),
            ))
        })
    }

    /// Handles a request for `session_id`; `None` for notifications.
    pub async fn handle(
        &self,
        session_id: &str,
        request: JsonRpcRequest,
    ) -> Option<JsonRpcResponse> {
        if request.jsonrpc != JSONRPC_VERSION {
            return request.id.map(|id| {
                JsonRpcResponse::failure(
                    id,
                    JsonRpcError::new(INVALID_REQUEST, "invalid json-rpc version"),
                )
            });
        }
        let id = request.id?;
        let params = request.params.unwrap_or(Value::Null);
        let outcome = match request.method.as_str() {
            "initialize" => Ok(self.initialize(session_id, &params)),
            "ping" => Ok(json!({})),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(session_id, params).await,
            other => {
                Err(JsonRpcError::new(METHOD_NOT_FOUND, format!("method not found: {other}")))
            }
        };
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    /// Parses and handles raw bytes.
    pub async fn handle_bytes(&self, session_id: &str, bytes: &[u8]) -> Option<JsonRpcResponse> {
        match Self::parse(bytes) {
            Ok(request) => self.handle(session_id, request).await,
            Err(response) => Some(*response),
        }
    }

    /// Records the end of a session that had connected.
    pub fn disconnect(&self, session_id: &str) {
        if self.is_connected(session_id) {
            self.dispatcher.bus().emit(NewEvent::session_disconnect(session_id));
        }
    }

    /// Returns true when `session_id` has an open session on the bus.
    fn is_connected(&self, session_id: &str) -> bool {
        self.dispatcher.bus().sessions().iter().any(|session| session.id == session_id)
    }

    /// `initialize`: announces capabilities and records the session once.
    fn initialize(&self, session_id: &str, params: &Value) -> Value {
        if !self.is_connected(session_id) {
            let client_name = params
                .pointer("/clientInfo/name")
                .and_then(Value::as_str)
                .map(str::to_string);
            self.dispatcher.bus().emit(NewEvent::session_connect(session_id, client_name));
        }
        let requested = params.get("protocolVersion").and_then(Value::as_str);
        let version = requested
            .filter(|version| SUPPORTED_PROTOCOL_VERSIONS.contains(version))
            .unwrap_or(PROTOCOL_VERSION);
        json!({
            "protocolVersion": version,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
        })
    }

    /// `tools/list`: enabled tools only.
    fn list_tools(&self) -> Result<Value, JsonRpcError> {
        let tools = self.dispatcher.enabled_tools();
        let listings: Vec<ToolListing<'_>> = tools.iter().map(ToolListing::from).collect();
        serde_json::to_value(listings)
            .map(|tools| json!({ "tools": tools }))
            .map_err(|err| internal(&err))
    }

    /// `tools/call`: routes through the dispatcher.
    async fn call_tool(&self, session_id: &str, params: Value) -> Result<Value, JsonRpcError> {
        let call: ToolCallParams = serde_json::from_value(params).map_err(|err| {
            JsonRpcError::new(INVALID_PARAMS, format!("invalid tool params: {err}"))
        })?;
        let arguments = call.arguments.unwrap_or_else(|| json!({}));
        let output =
            self.dispatcher.call(&call.name, arguments, Some(session_id.to_string())).await;
        serde_json::to_value(output).map_err(|err| internal(&err))
    }
}

/// Maps a serialization failure to an internal error.
fn internal(err: &serde_json::Error) -> JsonRpcError {
    JsonRpcError::new(INTERNAL_ERROR, format!("serialization failed: {err}"))
}

/// Returns a fresh session id with the given transport prefix.
#[must_use]
pub fn new_session_id(prefix: &str) -> String {
    let sequence = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{:x}-{sequence}", now_ms())
}
