// crates/toolhub-config/src/error.rs
// ============================================================================
// Module: Configuration Errors
// Description: Error taxonomy for configuration loading and persistence.
// Purpose: Give callers a single fail-closed error type for config access.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! One error enum covers reading, parsing, rendering, and validating the
//! configuration file. Each variant carries the underlying cause as text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading or writing configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Rendering the configuration failed.
    #[error("config serialization error: {0}")]
    Serialize(String),
    /// Invalid configuration data or path.
    #[error("invalid config: {0}")]
    Invalid(String),
}
