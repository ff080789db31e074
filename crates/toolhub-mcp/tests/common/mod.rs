// crates/toolhub-mcp/tests/common/mod.rs
// ============================================================================
// Module: MCP Test Fixtures
// Description: Loopback HTTP server and JSON-RPC client helpers.
// ============================================================================

#![allow(dead_code, reason = "Shared helpers are not used by every test crate.")]

use std::sync::Arc;
use std::thread;

use reqwest::Client;
use reqwest::Response;
use serde_json::Value;
use serde_json::json;
use tiny_http::Server;
use tokio::net::TcpListener;
use toolhub_config::Config;
use toolhub_config::ConfigStore;
use toolhub_core::TelemetryBus;
use toolhub_mcp::AppState;
use toolhub_mcp::BuiltinContext;
use toolhub_mcp::NoopDiagnosticSink;
use toolhub_mcp::builtin_dispatcher;
use toolhub_mcp::serve_http;
use toolhub_update::UpdateManager;

/// Running server plus handles into its state.
pub struct TestServer {
    /// Base URL, e.g. `http://127.0.0.1:1234`.
    pub base: String,
    /// Telemetry bus shared with the server.
    pub bus: TelemetryBus,
    /// Configuration store shared with the server.
    pub store: Arc<ConfigStore>,
    /// HTTP client.
    pub client: Client,
}

impl TestServer {
    /// Serves the HTTP transport on an ephemeral port.
    pub async fn start(management: bool, updater: Option<Arc<UpdateManager>>) -> Self {
        let bus = TelemetryBus::default();
        let store = Arc::new(ConfigStore::in_memory(Config::default()));
        let context =
            BuiltinContext::new(bus.clone(), Arc::clone(&store), updater.clone()).unwrap();
        let dispatcher = builtin_dispatcher(&context).unwrap();
        let state = AppState::new(dispatcher, updater, Arc::new(NoopDiagnosticSink));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_http(listener, state, management));
        Self {
            base: format!("http://{addr}"),
            bus,
            store,
            client: Client::new(),
        }
    }

    /// Returns the absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Posts a JSON-RPC message to `/mcp`.
    pub async fn rpc(&self, session: Option<&str>, message: &Value) -> Response {
        let mut request = self.client.post(self.url("/mcp")).json(message);
        if let Some(id) = session {
            request = request.header("Mcp-Session-Id", id);
        }
        request.send().await.unwrap()
    }

    /// Runs `initialize` and returns the minted session id.
    pub async fn initialize(&self, client_name: &str) -> String {
        let message = json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "clientInfo": { "name": client_name, "version": "1.0" },
            },
        });
        let response = self.rpc(None, &message).await;
        assert!(response.status().is_success());
        response.headers()["mcp-session-id"].to_str().unwrap().to_string()
    }

    /// Calls a tool and returns the JSON-RPC result.
    pub async fn call(&self, session: &str, name: &str, arguments: Value) -> Value {
        let message = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments },
        });
        let reply: Value = self.rpc(Some(session), &message).await.json().await.unwrap();
        reply["result"].clone()
    }

    /// Returns the names from `tools/list`.
    pub async fn tool_names(&self, session: &str) -> Vec<String> {
        let message = json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" });
        let reply: Value = self.rpc(Some(session), &message).await.json().await.unwrap();
        reply["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|tool| tool["name"].as_str().unwrap().to_string())
            .collect()
    }
}

/// Serves `body` for every request on a loopback port.
pub fn static_server(body: String) -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    thread::spawn(move || {
        for request in server.incoming_requests() {
            let _ = request.respond(tiny_http::Response::from_string(body.clone()));
        }
    });
    format!("http://{addr}")
}
