// crates/toolhub-core/src/catalog.rs
// ============================================================================
// Module: Tool Catalog
// Description: Immutable tool and group descriptors with referential checks.
// Purpose: Provide the static, validated catalog every layer addresses tools by.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The catalog is built once at process start and never mutated. Tool names
//! and group ids are the stable addressing scheme for clients, so
//! construction rejects duplicates and dangling group references up front.
//!
//! ## Invariants
//! - Tool names are unique across the catalog.
//! - Group ids are unique.
//! - Every tool that names a group names one that exists.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Catalog construction errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Two groups share an id.
    #[error("duplicate group id: {0}")]
    DuplicateGroup(String),
    /// Two tools share a name.
    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),
    /// A tool references a group that does not exist.
    #[error("tool {tool} references unknown group {group}")]
    UnknownGroup {
        /// Tool name.
        tool: String,
        /// Referenced group id.
        group: String,
    },
    /// A descriptor field is empty.
    #[error("invalid descriptor: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Descriptors
// ============================================================================

/// Named bundle of tools sharing default enablement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupDescriptor {
    /// Stable group identifier.
    pub id: String,
    /// Display category.
    pub category: String,
    /// Human-readable title.
    pub title: String,
    /// Whether member tools are enabled when nothing else decides.
    pub enabled_by_default: bool,
    /// Whether member tools need configuration before they can run.
    pub requires_config: bool,
    /// Optional documentation link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_url: Option<String>,
}

impl GroupDescriptor {
    /// Creates a group with the given default enablement.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        title: impl Into<String>,
        enabled_by_default: bool,
    ) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            title: title.into(),
            enabled_by_default,
            requires_config: false,
            docs_url: None,
        }
    }

    /// Marks the group as needing configuration.
    #[must_use]
    pub const fn requiring_config(mut self) -> Self {
        self.requires_config = true;
        self
    }

    /// Attaches a documentation link.
    #[must_use]
    pub fn with_docs(mut self, url: impl Into<String>) -> Self {
        self.docs_url = Some(url.into());
        self
    }
}

/// Callable tool metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    /// Globally unique tool name.
    pub name: String,
    /// Display category.
    pub category: String,
    /// Owning group id, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Human-readable title.
    pub title: String,
    /// Description shown to clients.
    pub description: String,
    /// Dotted config paths that must resolve to non-empty values.
    pub required_settings: Vec<String>,
    /// True when the tool calls a paid external service.
    pub remote: bool,
    /// JSON schema for the call parameters.
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Creates a tool descriptor with an empty object input schema.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            group: None,
            title: title.into(),
            description: description.into(),
            required_settings: Vec::new(),
            remote: false,
            input_schema: json!({ "type": "object", "properties": {} }),
        }
    }

    /// Places the tool in a group.
    #[must_use]
    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Adds a required configuration path.
    #[must_use]
    pub fn requires(mut self, path: impl Into<String>) -> Self {
        self.required_settings.push(path.into());
        self
    }

    /// Flags the tool as calling a remote service.
    #[must_use]
    pub const fn remote(mut self) -> Self {
        self.remote = true;
        self
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Validated, immutable set of tools and groups.
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Groups in declaration order.
    groups: Vec<GroupDescriptor>,
    /// Tools in declaration order.
    tools: Vec<ToolDescriptor>,
    /// Group index by id.
    group_index: BTreeMap<String, usize>,
    /// Tool index by name.
    tool_index: BTreeMap<String, usize>,
}

impl Catalog {
    /// Builds a catalog after checking uniqueness and group references.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on duplicates, blank identifiers, or dangling
    /// group references.
    pub fn new(
        groups: Vec<GroupDescriptor>,
        tools: Vec<ToolDescriptor>,
    ) -> Result<Self, CatalogError> {
        let mut group_index = BTreeMap::new();
        for (index, group) in groups.iter().enumerate() {
            if group.id.trim().is_empty() {
                return Err(CatalogError::Invalid("group id must be non-empty".to_string()));
            }
            if group_index.insert(group.id.clone(), index).is_some() {
                return Err(CatalogError::DuplicateGroup(group.id.clone()));
            }
        }
        let mut tool_index = BTreeMap::new();
        for (index, tool) in tools.iter().enumerate() {
            if tool.name.trim().is_empty() {
                return Err(CatalogError::Invalid("tool name must be non-empty".to_string()));
            }
            if let Some(group) = &tool.group
                && !group_index.contains_key(group)
            {
                return Err(CatalogError::UnknownGroup {
                    tool: tool.name.clone(),
                    group: group.clone(),
                });
            }
            if tool_index.insert(tool.name.clone(), index).is_some() {
                return Err(CatalogError::DuplicateTool(tool.name.clone()));
            }
        }
        Ok(Self {
            groups,
            tools,
            group_index,
            tool_index,
        })
    }

    /// Returns all tools in declaration order.
    #[must_use]
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Returns all groups in declaration order.
    #[must_use]
    pub fn groups(&self) -> &[GroupDescriptor] {
        &self.groups
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tool_index.get(name).and_then(|index| self.tools.get(*index))
    }

    /// Looks up a group by id.
    #[must_use]
    pub fn group(&self, id: &str) -> Option<&GroupDescriptor> {
        self.group_index.get(id).and_then(|index| self.groups.get(*index))
    }

    /// Returns the group owning a tool, if it declares one.
    #[must_use]
    pub fn group_of(&self, tool: &ToolDescriptor) -> Option<&GroupDescriptor> {
        tool.group.as_deref().and_then(|id| self.group(id))
    }

    /// Returns the tools belonging to a group.
    pub fn tools_in_group<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a ToolDescriptor> {
        self.tools.iter().filter(move |tool| tool.group.as_deref() == Some(id))
    }
}

#[cfg(test)]
mod tests;
