// crates/toolhub-config/src/lib.rs
// ============================================================================
// Module: Toolhub Config
// Description: Configuration store for the Toolhub tool server.
// Purpose: Load, merge, redact, and persist configuration safely.
// Dependencies: serde, serde_json, thiserror, toml
// ============================================================================

//! ## Overview
//! The config crate owns the single structured configuration file under the
//! data directory: nested credentials, per-tool enable overrides, and runtime
//! settings. The dispatch core consumes snapshots; it never writes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod error;
pub mod settings;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::Config;
pub use config::MASK;
pub use config::ServerSettings;
pub use config::UpdateSettings;
pub use config::is_present;
pub use error::ConfigError;
pub use settings::DATA_DIR_ENV;
pub use settings::DEFAULT_PORT;
pub use settings::PORT_ENV;
pub use settings::config_path;
pub use settings::log_path;
pub use settings::resolve_bind_host;
pub use settings::resolve_data_dir;
pub use settings::resolve_port;
pub use store::ConfigStore;
