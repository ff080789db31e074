// crates/toolhub-config/src/config.rs
// ============================================================================
// Module: Toolhub Configuration Model
// Description: Nested configuration values plus per-tool enable overrides.
// Purpose: Provide lookup, merge, and redaction over the persisted config.
// Dependencies: serde, serde_json, toml
// ============================================================================

//! ## Overview
//! [`Config`] holds free-form nested values (credentials, endpoints) next to a
//! map of explicit tool overrides and a few typed runtime sections. All
//! mutation from the management surface goes through [`Config::merge`], which
//! never lets a redacted placeholder overwrite a stored secret.
//!
//! ## Invariants
//! - `values` never contains JSON `null` after a merge or path update.
//! - [`MASK`] is never persisted in place of a secret by a merge.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::error::ConfigError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Placeholder rendered in place of secret values.
pub const MASK: &str = "********";

/// Top-level key whose string leaves are always treated as secrets.
const API_KEYS_SECTION: &str = "apiKeys";

/// Key fragments that mark a string value as secret.
const SECRET_KEY_FRAGMENTS: &[&str] = &["key", "token", "secret", "password"];

/// Reserved top-level keys owned by typed sections.
const RESERVED_KEYS: &[&str] = &["tools", "server", "update"];

// ============================================================================
// SECTION: Model
// ============================================================================

/// Persisted Toolhub configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Explicit per-tool enable overrides keyed by tool name.
    #[serde(default)]
    pub tools: BTreeMap<String, bool>,
    /// Runtime settings for the management surface.
    #[serde(default)]
    pub server: ServerSettings,
    /// Self-update settings.
    #[serde(default)]
    pub update: UpdateSettings,
    /// Free-form nested configuration (credentials, endpoints, ...).
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

/// Management surface settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Port for the HTTP transport and management surface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Bind host for the HTTP listener (defaults to loopback).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
}

/// Self-update settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSettings {
    /// Release descriptor URL override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_url: Option<String>,
    /// Allow cleartext `http://` release endpoints.
    #[serde(default)]
    pub allow_http: bool,
}

impl Config {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the TOML is malformed or typed
    /// sections have the wrong shape.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Renders configuration as TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] when rendering fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|err| ConfigError::Serialize(err.to_string()))
    }

    /// Resolves a dotted key path against the nested values.
    ///
    /// Any missing intermediate key yields `None`; this never fails.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.values.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Returns true when the dotted path resolves to a non-empty value.
    #[must_use]
    pub fn has_value(&self, path: &str) -> bool {
        self.lookup(path).is_some_and(is_present)
    }

    /// Returns the explicit override recorded for a tool, if any.
    #[must_use]
    pub fn tool_override(&self, name: &str) -> Option<bool> {
        self.tools.get(name).copied()
    }

    /// Records or clears an explicit tool override.
    pub fn set_tool_override(&mut self, name: &str, enabled: Option<bool>) {
        match enabled {
            Some(enabled) => {
                self.tools.insert(name.to_string(), enabled);
            }
            None => {
                self.tools.remove(name);
            }
        }
    }

    /// Sets a nested value at a dotted path, creating intermediate tables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for empty or reserved paths, or when an
    /// intermediate key holds a non-table value.
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<(), ConfigError> {
        let segments = split_path(path)?;
        if value.is_null() {
            return self.unset_path(path).map(|_| ());
        }
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| ConfigError::Invalid("config path must be non-empty".to_string()))?;
        let mut table = &mut self.values;
        for segment in parents {
            let entry =
                table.entry((*segment).to_string()).or_insert_with(|| Value::Object(Map::new()));
            table = entry.as_object_mut().ok_or_else(|| {
                ConfigError::Invalid(format!("config key {segment} is not a table"))
            })?;
        }
        table.insert((*last).to_string(), strip_nulls(value));
        Ok(())
    }

    /// Removes a nested value at a dotted path, returning the removed value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for empty or reserved paths.
    pub fn unset_path(&mut self, path: &str) -> Result<Option<Value>, ConfigError> {
        let segments = split_path(path)?;
        let Some((last, parents)) = segments.split_last() else {
            return Ok(None);
        };
        let mut table = &mut self.values;
        for segment in parents {
            match table.get_mut(*segment).and_then(Value::as_object_mut) {
                Some(next) => table = next,
                None => return Ok(None),
            }
        }
        Ok(table.remove(*last))
    }

    /// Merges a JSON patch into the configuration.
    ///
    /// Objects merge recursively, `null` deletes a key, and a string equal to
    /// [`MASK`] leaves the stored value untouched. Typed sections are validated
    /// after the merge; on failure the configuration is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the patch is not an object or the
    /// merged result does not match the typed sections.
    pub fn merge(&mut self, patch: &Value) -> Result<(), ConfigError> {
        if !patch.is_object() {
            return Err(ConfigError::Invalid("config patch must be an object".to_string()));
        }
        let mut current =
            serde_json::to_value(&*self).map_err(|err| ConfigError::Serialize(err.to_string()))?;
        merge_value(&mut current, patch);
        let merged: Self = serde_json::from_value(current)
            .map_err(|err| ConfigError::Invalid(format!("merged config is invalid: {err}")))?;
        *self = merged;
        Ok(())
    }

    /// Returns the configuration as JSON with secrets masked.
    #[must_use]
    pub fn redacted(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()));
        if let Value::Object(map) = &mut value {
            for (key, entry) in map.iter_mut() {
                let force = key == API_KEYS_SECTION;
                redact_value(key, entry, force);
            }
        }
        value
    }
}

// ============================================================================
// SECTION: Value Helpers
// ============================================================================

/// Returns true when a configuration value counts as set.
///
/// Null, `false`, zero, blank strings, and empty containers are absent.
#[must_use]
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Splits and validates a dotted config path.
fn split_path(path: &str) -> Result<Vec<&str>, ConfigError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|segment| segment.trim().is_empty()) {
        return Err(ConfigError::Invalid(format!("invalid config path: {path:?}")));
    }
    if segments.first().is_some_and(|first| RESERVED_KEYS.contains(first)) {
        return Err(ConfigError::Invalid(format!(
            "config path {path} targets a reserved section"
        )));
    }
    Ok(segments)
}

/// Deep-merges `patch` into `target`.
///
/// Masked leaves keep the stored value. Arrays carrying masks merge item by
/// item when their length matches the stored array.
fn merge_value(target: &mut Value, patch: &Value) {
    match (&mut *target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, incoming) in patch_map {
                if incoming.is_null() {
                    target_map.remove(key);
                    continue;
                }
                if let Some(slot) = target_map.get_mut(key) {
                    if incoming.is_object() && !slot.is_object() {
                        *slot = Value::Object(Map::new());
                    }
                    merge_value(slot, incoming);
                } else if !is_mask(incoming) {
                    let mut slot = if incoming.is_object() {
                        Value::Object(Map::new())
                    } else {
                        Value::Null
                    };
                    merge_value(&mut slot, incoming);
                    target_map.insert(key.clone(), slot);
                }
            }
        }
        (Value::Array(stored), Value::Array(items))
            if stored.len() == items.len() && contains_mask(patch) =>
        {
            for (slot, item) in stored.iter_mut().zip(items) {
                merge_value(slot, item);
            }
        }
        _ => {
            if !is_mask(patch) {
                *target = strip_nulls(patch.clone());
            }
        }
    }
}

/// Returns true when the value is the redaction placeholder or a non-empty
/// array made only of placeholders.
fn is_mask(value: &Value) -> bool {
    match value {
        Value::String(text) => text == MASK,
        Value::Array(items) => !items.is_empty() && items.iter().all(is_mask),
        _ => false,
    }
}

/// Returns true when a placeholder appears anywhere inside `value`.
fn contains_mask(value: &Value) -> bool {
    match value {
        Value::String(text) => text == MASK,
        Value::Array(items) => items.iter().any(contains_mask),
        Value::Object(map) => map.values().any(contains_mask),
        _ => false,
    }
}

/// Removes `null` entries recursively.
fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, entry)| !entry.is_null())
                .map(|(key, entry)| (key, strip_nulls(entry)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

/// Masks secret string leaves in place.
fn redact_value(key: &str, value: &mut Value, force: bool) {
    match value {
        Value::String(text) => {
            if !text.is_empty() && (force || is_secret_key(key)) {
                *text = MASK.to_string();
            }
        }
        Value::Object(map) => {
            let force = force || is_secret_key(key);
            for (child_key, child) in map.iter_mut() {
                redact_value(child_key, child, force);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_value(key, item, force);
            }
        }
        _ => {}
    }
}

/// Returns true when a key name denotes secret material.
fn is_secret_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SECRET_KEY_FRAGMENTS.iter().any(|fragment| lower.contains(fragment))
}

#[cfg(test)]
mod tests;
