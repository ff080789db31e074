// crates/toolhub-config/src/settings.rs
// ============================================================================
// Module: Runtime Settings
// Description: Data directory and management port resolution.
// Purpose: Apply flag > environment > config > default precedence.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Resolves where Toolhub keeps its state and which port the HTTP layer binds.
//! Environment overrides mirror the CLI flags so a client-spawned stdio server
//! can be pointed at a different data directory without arguments.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::path::Path;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::ConfigError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "TOOLHUB_DATA_DIR";
/// Environment variable overriding the management port.
pub const PORT_ENV: &str = "TOOLHUB_PORT";
/// Configuration file name inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Diagnostic log file name inside the data directory.
pub const LOG_FILE_NAME: &str = "toolhub.log";
/// Default management port.
pub const DEFAULT_PORT: u16 = 3977;
/// Default bind host.
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";
/// Directory name used under the home directory.
const HOME_DIR_NAME: &str = ".toolhub";
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves the data directory from flag, environment, or home directory.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] when the resolved path violates length
/// limits.
pub fn resolve_data_dir(flag: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let resolved = match flag {
        Some(path) => path.to_path_buf(),
        None => match env::var_os(DATA_DIR_ENV).filter(|value| !value.is_empty()) {
            Some(value) => PathBuf::from(value),
            None => home_dir()
                .map_or_else(|| PathBuf::from(HOME_DIR_NAME), |home| home.join(HOME_DIR_NAME)),
        },
    };
    validate_path(&resolved)?;
    Ok(resolved)
}

/// Resolves the management port from flag, environment, config, or default.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] when the environment value is not a port.
pub fn resolve_port(flag: Option<u16>, config: &Config) -> Result<u16, ConfigError> {
    if let Some(port) = flag {
        return Ok(port);
    }
    if let Ok(raw) = env::var(PORT_ENV) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return trimmed
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid(format!("{PORT_ENV} must be a port number")));
        }
    }
    Ok(config.server.port.unwrap_or(DEFAULT_PORT))
}

/// Returns the bind host configured for the HTTP listener.
#[must_use]
pub fn resolve_bind_host(config: &Config) -> String {
    config
        .server
        .bind
        .as_deref()
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .unwrap_or(DEFAULT_BIND_HOST)
        .to_string()
}

/// Returns the configuration file path inside a data directory.
#[must_use]
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE_NAME)
}

/// Returns the diagnostic log path inside a data directory.
#[must_use]
pub fn log_path(data_dir: &Path) -> PathBuf {
    data_dir.join(LOG_FILE_NAME)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the user's home directory from the environment.
fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Validates a path against length limits.
pub(crate) fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("path component too long".to_string()));
        }
    }
    Ok(())
}
