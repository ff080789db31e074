// crates/toolhub-mcp/src/tools.rs
// ============================================================================
// Module: Built-in Tools
// Description: Static catalog and handlers shipped with the Toolhub binary.
// Purpose: Bind every catalog entry to a handler and build the dispatcher.
// Dependencies: reqwest, toolhub-core, toolhub-update
// ============================================================================

//! ## Overview
//! The built-in catalog has four groups: `core` and `system` are on by
//! default, `web` is off until enabled, and `webhook` stays off until
//! `webhooks.url` is configured. Handlers return [`ToolError`] values; the
//! invoker turns them into flagged error results.
//!
//! Network tools share one [`reqwest::Client`] with a per-request timeout and
//! read responses under a byte cap.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::redirect::Policy;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use toolhub_config::ConfigStore;
use toolhub_core::Catalog;
use toolhub_core::CatalogError;
use toolhub_core::Dispatcher;
use toolhub_core::GroupDescriptor;
use toolhub_core::InvocationContext;
use toolhub_core::TelemetryBus;
use toolhub_core::ToolDescriptor;
use toolhub_core::ToolError;
use toolhub_core::ToolHandler;
use toolhub_core::ToolOutput;
use toolhub_core::time::now_ms;
use toolhub_update::NoopObserver;
use toolhub_update::UpdateManager;
use toolhub_update::UpdateObserver;
use toolhub_update::UpdateOutcome;
use toolhub_update::UpdatePhase;
use url::Url;

use crate::server::McpServerError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Always-on utility tools.
pub const CORE_GROUP: &str = "core";
/// Server introspection and self-update tools.
pub const SYSTEM_GROUP: &str = "system";
/// Outbound web access.
pub const WEB_GROUP: &str = "web";
/// Outbound webhook delivery.
pub const WEBHOOK_GROUP: &str = "webhook";
/// Config path holding the webhook endpoint.
pub const WEBHOOK_URL_SETTING: &str = "webhooks.url";
/// Config path holding an optional bearer token for the webhook.
pub const WEBHOOK_TOKEN_SETTING: &str = "webhooks.token";
/// Per-request timeout for network tools.
const TOOL_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Default cap on bytes returned by `fetch_url`.
const DEFAULT_FETCH_BYTES: usize = 64 * 1024;
/// Hard cap on bytes returned by `fetch_url`.
const MAX_FETCH_BYTES: usize = 1024 * 1024;
/// Cap on webhook response bodies echoed back.
const MAX_WEBHOOK_REPLY_BYTES: usize = 4 * 1024;
/// User agent for outbound tool requests.
const USER_AGENT: &str = concat!("toolhub/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Returns the built-in groups and tools.
///
/// # Errors
///
/// Returns [`CatalogError`] if the static tables are inconsistent.
pub fn builtin_catalog() -> Result<Catalog, CatalogError> {
    let groups = vec![
        GroupDescriptor::new(CORE_GROUP, "general", "Core utilities", true),
        GroupDescriptor::new(SYSTEM_GROUP, "system", "Server and updates", true),
        GroupDescriptor::new(WEB_GROUP, "web", "Web access", false),
        GroupDescriptor::new(WEBHOOK_GROUP, "integrations", "Webhooks", false)
            .requiring_config()
            .with_docs("https://github.com/toolhub-dev/toolhub#webhooks"),
    ];
    let tools = vec![
        ToolDescriptor::new("echo", "general", "Echo", "Returns the given text unchanged.")
            .in_group(CORE_GROUP)
            .with_schema(json!({
                "type": "object",
                "properties": { "text": { "type": "string", "description": "Text to echo." } },
                "required": ["text"],
            })),
        ToolDescriptor::new(
            "current_time",
            "general",
            "Current time",
            "Returns the server clock as unix milliseconds and seconds.",
        )
        .in_group(CORE_GROUP),
        ToolDescriptor::new(
            "server_stats",
            "system",
            "Server statistics",
            "Reports invocation totals, per-tool statistics, and connected sessions.",
        )
        .in_group(SYSTEM_GROUP),
        ToolDescriptor::new(
            "check_update",
            "system",
            "Check for updates",
            "Compares the running version with the latest published release.",
        )
        .in_group(SYSTEM_GROUP),
        ToolDescriptor::new(
            "self_update",
            "system",
            "Self update",
            "Downloads, verifies, and installs the latest release over this binary.",
        )
        .in_group(SYSTEM_GROUP),
        ToolDescriptor::new(
            "fetch_url",
            "web",
            "Fetch URL",
            "Fetches an http(s) URL and returns the status and body text.",
        )
        .in_group(WEB_GROUP)
        .remote()
        .with_schema(json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Absolute http or https URL." },
                "max_bytes": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_FETCH_BYTES,
                    "description": "Body bytes to return (default 65536).",
                },
            },
            "required": ["url"],
        })),
        ToolDescriptor::new(
            "webhook_post",
            "integrations",
            "Post webhook",
            "Posts a JSON payload to the configured webhook endpoint.",
        )
        .in_group(WEBHOOK_GROUP)
        .requires(WEBHOOK_URL_SETTING)
        .remote()
        .with_schema(json!({
            "type": "object",
            "properties": {
                "event": { "type": "string", "description": "Event label (default toolhub)." },
                "payload": { "description": "JSON payload to deliver." },
            },
            "required": ["payload"],
        })),
    ];
    Catalog::new(groups, tools)
}

/// Collaborators the built-in handlers need.
#[derive(Clone)]
pub struct BuiltinContext {
    /// Telemetry bus for `server_stats`.
    pub bus: TelemetryBus,
    /// Configuration store for the webhook endpoint.
    pub config: Arc<ConfigStore>,
    /// Update manager; `None` disables the update tools.
    pub updater: Option<Arc<UpdateManager>>,
    /// Client shared by network tools.
    pub http: Client,
}

impl BuiltinContext {
    /// Builds a context with a fresh HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError::Init`] when the HTTP client cannot be built.
    pub fn new(
        bus: TelemetryBus,
        config: Arc<ConfigStore>,
        updater: Option<Arc<UpdateManager>>,
    ) -> Result<Self, McpServerError> {
        let http = Client::builder()
            .timeout(TOOL_HTTP_TIMEOUT)
            .redirect(Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| McpServerError::Init(format!("http client: {err}")))?;
        Ok(Self {
            bus,
            config,
            updater,
            http,
        })
    }
}

/// Returns a handler for every built-in tool.
#[must_use]
pub fn builtin_handlers(context: &BuiltinContext) -> BTreeMap<String, Arc<dyn ToolHandler>> {
    let mut handlers: BTreeMap<String, Arc<dyn ToolHandler>> = BTreeMap::new();
    handlers.insert("echo".to_string(), Arc::new(EchoTool));
    handlers.insert("current_time".to_string(), Arc::new(CurrentTimeTool));
    handlers.insert(
        "server_stats".to_string(),
        Arc::new(ServerStatsTool {
            bus: context.bus.clone(),
        }),
    );
    handlers.insert(
        "check_update".to_string(),
        Arc::new(CheckUpdateTool {
            updater: context.updater.clone(),
        }),
    );
    handlers.insert(
        "self_update".to_string(),
        Arc::new(SelfUpdateTool {
            updater: context.updater.clone(),
        }),
    );
    handlers.insert(
        "fetch_url".to_string(),
        Arc::new(FetchUrlTool {
            http: context.http.clone(),
        }),
    );
    handlers.insert(
        "webhook_post".to_string(),
        Arc::new(WebhookPostTool {
            http: context.http.clone(),
            config: Arc::clone(&context.config),
        }),
    );
    handlers
}

/// Builds the dispatcher over the built-in catalog.
///
/// # Errors
///
/// Returns [`McpServerError::Init`] when the catalog or bindings are invalid.
pub fn builtin_dispatcher(context: &BuiltinContext) -> Result<Dispatcher, McpServerError> {
    let catalog = builtin_catalog().map_err(|err| McpServerError::Init(err.to_string()))?;
    Dispatcher::new(
        Arc::new(catalog),
        builtin_handlers(context),
        context.bus.clone(),
        Arc::clone(&context.config),
    )
    .map_err(|err| McpServerError::Init(err.to_string()))
}

// ============================================================================
// SECTION: Update Transcript
// ============================================================================

/// One observed update phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseEntry {
    /// Phase entered.
    pub phase: UpdatePhase,
    /// Phase detail.
    pub detail: String,
}

/// Observer collecting update phases for a response.
#[derive(Debug, Default)]
pub struct PhaseTranscript {
    /// Phases in arrival order.
    entries: Mutex<Vec<PhaseEntry>>,
}

impl PhaseTranscript {
    /// Returns the collected phases.
    #[must_use]
    pub fn entries(&self) -> Vec<PhaseEntry> {
        self.entries.lock().map(|entries| entries.clone()).unwrap_or_default()
    }

    /// Renders one `phase: detail` line per entry.
    #[must_use]
    pub fn render(&self) -> String {
        self.entries()
            .iter()
            .map(|entry| format!("{}: {}", entry.phase.as_str(), entry.detail))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl UpdateObserver for PhaseTranscript {
    fn on_phase(&self, phase: UpdatePhase, detail: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(PhaseEntry {
                phase,
                detail: detail.to_string(),
            });
        }
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `echo`
struct EchoTool;

#[async_trait]
impl ToolHandler for EchoTool {
    async fn call(
        &self,
        input: Value,
        _context: InvocationContext,
    ) -> Result<ToolOutput, ToolError> {
        let text = required_str(&input, "text")?;
        Ok(ToolOutput::text(text))
    }
}

/// `current_time`
struct CurrentTimeTool;

#[async_trait]
impl ToolHandler for CurrentTimeTool {
    async fn call(
        &self,
        _input: Value,
        _context: InvocationContext,
    ) -> Result<ToolOutput, ToolError> {
        let now = now_ms();
        Ok(ToolOutput::json(&json!({ "unix_ms": now, "unix_seconds": now / 1000 })))
    }
}

/// `server_stats`
struct ServerStatsTool {
    /// Bus to snapshot.
    bus: TelemetryBus,
}

#[async_trait]
impl ToolHandler for ServerStatsTool {
    async fn call(
        &self,
        _input: Value,
        _context: InvocationContext,
    ) -> Result<ToolOutput, ToolError> {
        let stats = serde_json::to_value(self.bus.stats())
            .map_err(|err| ToolError::Failed(format!("stats serialization failed: {err}")))?;
        let sessions = serde_json::to_value(self.bus.sessions())
            .map_err(|err| ToolError::Failed(format!("session serialization failed: {err}")))?;
        Ok(ToolOutput::json(&json!({ "stats": stats, "sessions": sessions })))
    }
}

/// `check_update`
struct CheckUpdateTool {
    /// Update manager, when available.
    updater: Option<Arc<UpdateManager>>,
}

#[async_trait]
impl ToolHandler for CheckUpdateTool {
    async fn call(
        &self,
        _input: Value,
        _context: InvocationContext,
    ) -> Result<ToolOutput, ToolError> {
        let updater = available(self.updater.as_ref())?;
        let check = updater
            .check(&NoopObserver)
            .await
            .map_err(|err| ToolError::Upstream(format!("update check failed: {err}")))?;
        let value = serde_json::to_value(&check)
            .map_err(|err| ToolError::Failed(format!("serialization failed: {err}")))?;
        Ok(ToolOutput::json(&value))
    }
}

/// `self_update`
struct SelfUpdateTool {
    /// Update manager, when available.
    updater: Option<Arc<UpdateManager>>,
}

#[async_trait]
impl ToolHandler for SelfUpdateTool {
    async fn call(
        &self,
        _input: Value,
        _context: InvocationContext,
    ) -> Result<ToolOutput, ToolError> {
        let updater = available(self.updater.as_ref())?;
        let transcript = PhaseTranscript::default();
        match updater.update(&transcript).await {
            Ok(UpdateOutcome::UpToDate {
                current_version,
            }) => Ok(ToolOutput::text(format!(
                "{}\ntoolhub {current_version} is already the latest release",
                transcript.render()
            ))),
            Ok(UpdateOutcome::Updated {
                from,
                to,
            }) => Ok(ToolOutput::text(format!(
                "{}\nupdated toolhub {from} -> {to}; restart the server to run the new version",
                transcript.render()
            ))),
            Err(err) => {
                Err(ToolError::Failed(format!("{}\nupdate failed: {err}", transcript.render())))
            }
        }
    }
}

/// `fetch_url`
struct FetchUrlTool {
    /// Shared client.
    http: Client,
}

#[async_trait]
impl ToolHandler for FetchUrlTool {
    async fn call(
        &self,
        input: Value,
        _context: InvocationContext,
    ) -> Result<ToolOutput, ToolError> {
        let url = web_url(required_str(&input, "url")?)?;
        let limit = match input.get("max_bytes") {
            None | Some(Value::Null) => DEFAULT_FETCH_BYTES,
            Some(value) => value
                .as_u64()
                .and_then(|bytes| usize::try_from(bytes).ok())
                .filter(|bytes| (1 ..= MAX_FETCH_BYTES).contains(bytes))
                .ok_or_else(|| {
                    ToolError::InvalidInput(format!(
                        "max_bytes must be an integer between 1 and {MAX_FETCH_BYTES}"
                    ))
                })?,
        };
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|err| ToolError::Upstream(format!("GET {url} failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Upstream(format!(
                "GET {url} returned status {}",
                status.as_u16()
            )));
        }
        let (body, truncated) = read_capped(response, limit).await?;
        let mut text = format!("HTTP {}\n\n{}", status.as_u16(), String::from_utf8_lossy(&body));
        if truncated {
            let _ = write!(text, "\n\n[truncated after {limit} bytes]");
        }
        Ok(ToolOutput::text(text))
    }
}

/// `webhook_post`
struct WebhookPostTool {
    /// Shared client.
    http: Client,
    /// Store holding the endpoint.
    config: Arc<ConfigStore>,
}

#[async_trait]
impl ToolHandler for WebhookPostTool {
    async fn call(
        &self,
        input: Value,
        _context: InvocationContext,
    ) -> Result<ToolOutput, ToolError> {
        let payload = input
            .get("payload")
            .cloned()
            .ok_or_else(|| ToolError::InvalidInput("payload is required".to_string()))?;
        let event = match input.get("event") {
            None | Some(Value::Null) => "toolhub".to_string(),
            Some(Value::String(event)) => event.clone(),
            Some(_) => return Err(ToolError::InvalidInput("event must be a string".to_string())),
        };
        let config = self.config.snapshot();
        let endpoint = config
            .lookup(WEBHOOK_URL_SETTING)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ToolError::InvalidInput(format!("{WEBHOOK_URL_SETTING} is not a string"))
            })?;
        let url = web_url(endpoint)?;
        let mut request =
            self.http.post(url.clone()).json(&json!({ "event": event, "payload": payload }));
        if let Some(token) = config.lookup(WEBHOOK_TOKEN_SETTING).and_then(Value::as_str) {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|err| ToolError::Upstream(format!("POST {url} failed: {err}")))?;
        let status = response.status();
        let (reply, _) = read_capped(response, MAX_WEBHOOK_REPLY_BYTES).await?;
        let reply = String::from_utf8_lossy(&reply);
        if !status.is_success() {
            return Err(ToolError::Upstream(format!(
                "webhook returned status {}: {}",
                status.as_u16(),
                reply.trim()
            )));
        }
        Ok(ToolOutput::text(format!("webhook delivered (status {})", status.as_u16())))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads a required string parameter.
fn required_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    input
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidInput(format!("{key} must be a string")))
}

/// Parses an absolute http(s) URL.
fn web_url(raw: &str) -> Result<Url, ToolError> {
    let url = Url::parse(raw).map_err(|err| ToolError::InvalidInput(format!("{raw}: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ToolError::InvalidInput(format!("unsupported scheme {other}"))),
    }
}

/// Unwraps the update manager or reports it missing.
fn available(updater: Option<&Arc<UpdateManager>>) -> Result<&UpdateManager, ToolError> {
    updater
        .map(Arc::as_ref)
        .ok_or_else(|| ToolError::Failed("self-update is unavailable in this process".to_string()))
}

/// Reads at most `limit` body bytes; the flag reports a cut.
async fn read_capped(
    mut response: reqwest::Response,
    limit: usize,
) -> Result<(Vec<u8>, bool), ToolError> {
    let mut body = Vec::new();
    while let Some(chunk) =
        response.chunk().await.map_err(|err| ToolError::Upstream(err.to_string()))?
    {
        let room = limit - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[.. room]);
            return Ok((body, true));
        }
        body.extend_from_slice(&chunk);
    }
    Ok((body, false))
}
