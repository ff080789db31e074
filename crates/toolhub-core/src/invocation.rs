// crates/toolhub-core/src/invocation.rs
// ============================================================================
// Module: Invocation Wrapper
// Description: Instrumented, failure-contained execution of tool handlers.
// Purpose: Guarantee every call is recorded and no handler failure escapes.
// Dependencies: async-trait, tokio, toolhub-config
// ============================================================================

//! ## Overview
//! [`Invoker::invoke`] is the call boundary. It records a `call` event before
//! any awaiting work, re-checks required configuration against a fresh
//! snapshot, runs the handler as its own task, and collapses the outcome into
//! a [`ToolOutput`]. Handler errors and panics both become error results.
//!
//! ## Invariants
//! - Each call yields exactly one `result` or one `error` event, never both.
//! - A guard failure never reaches the handler.
//! - Invocations are independent tasks; nothing serializes them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use toolhub_config::ConfigStore;

use crate::catalog::ToolDescriptor;
use crate::enablement::missing_requirements;
use crate::telemetry::NewEvent;
use crate::telemetry::TelemetryBus;

// ============================================================================
// SECTION: Handler Contract
// ============================================================================

/// Handler failure reported as a value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Parameters did not match what the tool expects.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// An upstream service failed or answered with something unusable.
    #[error("upstream failure: {0}")]
    Upstream(String),
    /// Any other handler failure.
    #[error("{0}")]
    Failed(String),
}

/// Per-call metadata passed to handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    /// Id of the `call` event that opened this invocation.
    pub call_id: u64,
    /// Protocol session the call arrived on.
    pub session_id: Option<String>,
}

/// Protocol content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    /// Plain text.
    Text {
        /// Text payload.
        text: String,
    },
}

/// Tool call result in protocol shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    /// Content blocks.
    pub content: Vec<ToolContent>,
    /// True when the content describes a failure.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful textual result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: text.into(),
            }],
            is_error: false,
        }
    }

    /// Successful result rendering a JSON value.
    #[must_use]
    pub fn json(value: &Value) -> Self {
        let rendered = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        Self::text(rendered)
    }

    /// Error result flagged for the client.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Returns the concatenated text content.
    #[must_use]
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(|block| match block {
                ToolContent::Text {
                    text,
                } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Tool body executed by the invoker.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs the tool with the call parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when the tool cannot produce a result.
    async fn call(&self, input: Value, context: InvocationContext)
    -> Result<ToolOutput, ToolError>;
}

// ============================================================================
// SECTION: Invoker
// ============================================================================

/// Wraps handler calls with telemetry, guard re-checks, and containment.
#[derive(Clone)]
pub struct Invoker {
    /// Event sink.
    bus: TelemetryBus,
    /// Live configuration.
    config: Arc<ConfigStore>,
}

impl Invoker {
    /// Creates an invoker over a bus and config store.
    #[must_use]
    pub const fn new(bus: TelemetryBus, config: Arc<ConfigStore>) -> Self {
        Self {
            bus,
            config,
        }
    }

    /// Returns the telemetry bus.
    #[must_use]
    pub const fn bus(&self) -> &TelemetryBus {
        &self.bus
    }

    /// Executes one tool call.
    pub async fn invoke(
        &self,
        tool: &ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
        input: Value,
        session_id: Option<String>,
    ) -> ToolOutput {
        let call = self.bus.emit(NewEvent::call(tool, input.clone(), session_id.clone()));

        let missing = missing_requirements(tool, &self.config.snapshot());
        if !missing.is_empty() {
            let message = format!("missing required configuration: {}", missing.join(", "));
            self.bus.emit(NewEvent::error(tool, call.id, 0.0, message.clone(), session_id));
            return ToolOutput::error(format!(
                "{} is not configured ({message}). Set the value with `toolhub config set` or \
                 the dashboard, then retry.",
                tool.name
            ));
        }

        let context = InvocationContext {
            call_id: call.id,
            session_id: session_id.clone(),
        };
        let started = Instant::now();
        let outcome = tokio::spawn(async move { handler.call(input, context).await }).await;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(Ok(output)) => {
                self.bus.emit(NewEvent::result(tool, call.id, duration_ms, session_id));
                output
            }
            Ok(Err(err)) => {
                let message = err.to_string();
                self.bus.emit(NewEvent::error(
                    tool,
                    call.id,
                    duration_ms,
                    message.clone(),
                    session_id,
                ));
                ToolOutput::error(format!("{} failed: {message}", tool.name))
            }
            Err(join) => {
                let message = if join.is_panic() {
                    format!("handler panicked: {}", panic_message(join.into_panic().as_ref()))
                } else {
                    "handler task was cancelled".to_string()
                };
                self.bus.emit(NewEvent::error(
                    tool,
                    call.id,
                    duration_ms,
                    message.clone(),
                    session_id,
                ));
                ToolOutput::error(format!("{} failed: {message}", tool.name))
            }
        }
    }
}

/// Extracts a readable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests;
