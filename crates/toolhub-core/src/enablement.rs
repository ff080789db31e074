// crates/toolhub-core/src/enablement.rs
// ============================================================================
// Module: Enablement Resolver
// Description: Pure mapping from descriptor and config snapshot to enablement.
// Purpose: Decide which tools are exposed and callable.
// Dependencies: toolhub-config, serde
// ============================================================================

//! ## Overview
//! Enablement is a total, deterministic function of a tool descriptor, its
//! owning group, and a configuration snapshot. The first matching rule wins:
//!
//! 1. An explicit override enables the tool only when it is `true` and every
//!    required path is present. An explicit `false` always disables.
//! 2. Declared required paths decide on their own, ignoring the group default.
//! 3. Otherwise the group default applies; a tool without a group is enabled.
//!
//! Callers resolve both when listing tools and right before each invocation,
//! since configuration can change in between.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use toolhub_config::Config;

use crate::catalog::Catalog;
use crate::catalog::GroupDescriptor;
use crate::catalog::ToolDescriptor;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Rule that decided a tool's enablement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnablementReason {
    /// Explicit `true` override with all requirements present.
    OverrideEnabled,
    /// Explicit `false` override.
    OverrideDisabled,
    /// Required configuration is missing.
    MissingConfig,
    /// All required configuration is present.
    Configured,
    /// Group default applied.
    GroupDefault,
}

/// Outcome of resolving a tool against a config snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Enablement {
    /// Whether the tool is callable.
    pub enabled: bool,
    /// Rule that decided.
    pub reason: EnablementReason,
    /// Required paths that did not resolve.
    pub missing: Vec<String>,
}

/// Management view of a single tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    /// Tool name.
    pub name: String,
    /// Owning group id.
    pub group: Option<String>,
    /// Display category.
    pub category: String,
    /// Human-readable title.
    pub title: String,
    /// Resolved enablement.
    pub enabled: bool,
    /// Explicit override recorded in config.
    #[serde(rename = "override")]
    pub explicit_override: Option<bool>,
    /// Rule that decided.
    pub reason: EnablementReason,
    /// Required paths that did not resolve.
    pub missing: Vec<String>,
    /// True when the tool calls a remote service.
    pub remote: bool,
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Returns the required paths of `tool` that do not resolve to a value.
#[must_use]
pub fn missing_requirements(tool: &ToolDescriptor, config: &Config) -> Vec<String> {
    tool.required_settings.iter().filter(|path| !config.has_value(path)).cloned().collect()
}

/// Resolves enablement and the rule that decided it.
///
/// `group` must be the group the catalog resolves for `tool`; `None` means the
/// tool declares no group.
#[must_use]
pub fn resolve(
    tool: &ToolDescriptor,
    group: Option<&GroupDescriptor>,
    config: &Config,
) -> Enablement {
    let missing = missing_requirements(tool, config);
    let (enabled, reason) = match config.tool_override(&tool.name) {
        Some(false) => (false, EnablementReason::OverrideDisabled),
        Some(true) if missing.is_empty() => (true, EnablementReason::OverrideEnabled),
        Some(true) => (false, EnablementReason::MissingConfig),
        None if tool.required_settings.is_empty() => {
            (group.is_none_or(|group| group.enabled_by_default), EnablementReason::GroupDefault)
        }
        None if missing.is_empty() => (true, EnablementReason::Configured),
        None => (false, EnablementReason::MissingConfig),
    };
    Enablement {
        enabled,
        reason,
        missing,
    }
}

/// Returns true when the tool is callable under `config`.
#[must_use]
pub fn is_enabled(tool: &ToolDescriptor, group: Option<&GroupDescriptor>, config: &Config) -> bool {
    resolve(tool, group, config).enabled
}

/// Resolves every catalog tool for management listings.
#[must_use]
pub fn tool_statuses(catalog: &Catalog, config: &Config) -> Vec<ToolStatus> {
    catalog
        .tools()
        .iter()
        .map(|tool| {
            let resolved = resolve(tool, catalog.group_of(tool), config);
            ToolStatus {
                name: tool.name.clone(),
                group: tool.group.clone(),
                category: tool.category.clone(),
                title: tool.title.clone(),
                enabled: resolved.enabled,
                explicit_override: config.tool_override(&tool.name),
                reason: resolved.reason,
                missing: resolved.missing,
                remote: tool.remote,
            }
        })
        .collect()
}

impl Catalog {
    /// Resolves a tool against its own catalog group.
    #[must_use]
    pub fn is_enabled(&self, tool: &ToolDescriptor, config: &Config) -> bool {
        is_enabled(tool, self.group_of(tool), config)
    }

    /// Returns the tools enabled under `config`, in declaration order.
    pub fn enabled_tools<'a>(
        &'a self,
        config: &'a Config,
    ) -> impl Iterator<Item = &'a ToolDescriptor> {
        self.tools().iter().filter(move |tool| self.is_enabled(tool, config))
    }
}
