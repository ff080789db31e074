// crates/toolhub-core/src/dispatch.rs
// ============================================================================
// Module: Tool Dispatcher
// Description: Binds catalog descriptors to handlers and routes calls.
// Purpose: Enforce enablement at listing time and again at call time.
// Dependencies: toolhub-config
// ============================================================================

//! ## Overview
//! The dispatcher is what protocol layers talk to. It lists the tools enabled
//! under the current configuration and routes calls by name. Unknown tools
//! and tools switched off by an override or their group default are refused
//! before any telemetry is recorded. A tool that is only missing configuration
//! goes through the [`Invoker`], whose guard reports the missing keys.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use toolhub_config::ConfigStore;

use crate::catalog::Catalog;
use crate::catalog::ToolDescriptor;
use crate::enablement::EnablementReason;
use crate::enablement::resolve;
use crate::invocation::Invoker;
use crate::invocation::ToolHandler;
use crate::invocation::ToolOutput;
use crate::telemetry::TelemetryBus;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Handler binding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// A catalog tool has no handler.
    #[error("no handler registered for tool {0}")]
    MissingHandler(String),
    /// A handler names a tool absent from the catalog.
    #[error("handler registered for unknown tool {0}")]
    UnknownTool(String),
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Routes tool calls to handlers.
#[derive(Clone)]
pub struct Dispatcher {
    /// Tool catalog.
    catalog: Arc<Catalog>,
    /// Handlers keyed by tool name.
    handlers: BTreeMap<String, Arc<dyn ToolHandler>>,
    /// Configuration consulted for enablement.
    config: Arc<ConfigStore>,
    /// Call wrapper.
    invoker: Invoker,
}

impl Dispatcher {
    /// Binds handlers to catalog tools.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when a tool lacks a handler or a handler
    /// names an unknown tool.
    pub fn new(
        catalog: Arc<Catalog>,
        handlers: BTreeMap<String, Arc<dyn ToolHandler>>,
        bus: TelemetryBus,
        config: Arc<ConfigStore>,
    ) -> Result<Self, DispatchError> {
        if let Some(name) = handlers.keys().find(|name| catalog.tool(name).is_none()) {
            return Err(DispatchError::UnknownTool(name.clone()));
        }
        if let Some(tool) = catalog.tools().iter().find(|tool| !handlers.contains_key(&tool.name))
        {
            return Err(DispatchError::MissingHandler(tool.name.clone()));
        }
        Ok(Self {
            catalog,
            handlers,
            invoker: Invoker::new(bus, Arc::clone(&config)),
            config,
        })
    }

    /// Returns the catalog.
    #[must_use]
    pub const fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Returns the telemetry bus.
    #[must_use]
    pub const fn bus(&self) -> &TelemetryBus {
        self.invoker.bus()
    }

    /// Returns the configuration store.
    #[must_use]
    pub const fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    /// Returns the tools enabled under the current configuration.
    #[must_use]
    pub fn enabled_tools(&self) -> Vec<ToolDescriptor> {
        let config = self.config.snapshot();
        self.catalog.enabled_tools(&config).cloned().collect()
    }

    /// Calls a tool by name.
    pub async fn call(&self, name: &str, input: Value, session_id: Option<String>) -> ToolOutput {
        let (Some(tool), Some(handler)) = (self.catalog.tool(name), self.handlers.get(name)) else {
            return ToolOutput::error(format!("unknown tool: {name}"));
        };
        let config = self.config.snapshot();
        let enablement = resolve(tool, self.catalog.group_of(tool), &config);
        if !enablement.enabled && enablement.reason != EnablementReason::MissingConfig {
            return ToolOutput::error(format!(
                "tool {name} is disabled; enable it with `toolhub tools enable {name}`"
            ));
        }
        self.invoker.invoke(tool, Arc::clone(handler), input, session_id).await
    }
}
