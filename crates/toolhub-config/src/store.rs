// crates/toolhub-config/src/store.rs
// ============================================================================
// Module: Configuration Store
// Description: Cached, file-backed configuration with serialized writes.
// Purpose: Hand out immutable snapshots and persist merges atomically.
// Dependencies: std, toml
// ============================================================================

//! ## Overview
//! [`ConfigStore`] owns the on-disk `config.toml`. Readers receive `Arc`
//! snapshots so the resolver sees a consistent view for a single decision.
//! Snapshots re-read the file when its modification time changes, which keeps
//! a running server in sync with edits made through the CLI.
//!
//! ## Invariants
//! - Writers inside one process are serialized; each write is a full
//!   read-modify-write against the latest snapshot.
//! - Files are replaced by a same-directory rename, never truncated in place.
//! - A file that fails to parse during a refresh leaves the previous snapshot
//!   in effect.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;

use serde_json::Value;

use crate::config::Config;
use crate::error::ConfigError;
use crate::settings::validate_path;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Attempts made to allocate a unique temporary file.
const TEMP_ATTEMPTS: usize = 16;
/// Counter used to build unique temporary file names.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// SECTION: Store
// ============================================================================

/// Cached snapshot and the file modification time it was read at.
struct Cached {
    /// Current configuration snapshot.
    config: Arc<Config>,
    /// Modification time of the file when it was last read or written.
    modified_at: Option<SystemTime>,
}

/// File-backed configuration store.
pub struct ConfigStore {
    /// Backing file; `None` keeps the store purely in memory.
    path: Option<PathBuf>,
    /// Cached snapshot.
    cached: RwLock<Cached>,
    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl ConfigStore {
    /// Opens the store at `path`, loading the file when it exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        validate_path(&path)?;
        let (config, modified_at) = match read_config(&path)? {
            Some(loaded) => loaded,
            None => (Config::default(), None),
        };
        Ok(Self {
            path: Some(path),
            cached: RwLock::new(Cached {
                config: Arc::new(config),
                modified_at,
            }),
            write_lock: Mutex::new(()),
        })
    }

    /// Creates a store that never touches the filesystem.
    #[must_use]
    pub fn in_memory(config: Config) -> Self {
        Self {
            path: None,
            cached: RwLock::new(Cached {
                config: Arc::new(config),
                modified_at: None,
            }),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the backing file path, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the current configuration snapshot.
    ///
    /// Picks up external edits when the file's modification time moved.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Config> {
        if let Some(path) = &self.path {
            let on_disk = modified_time(path);
            let stale =
                self.cached.read().map(|cached| cached.modified_at != on_disk).unwrap_or(false);
            if stale {
                self.refresh(path);
            }
        }
        self.cached
            .read()
            .map(|cached| Arc::clone(&cached.config))
            .unwrap_or_else(|poisoned| Arc::clone(&poisoned.into_inner().config))
    }

    /// Applies a mutation and persists the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the mutation rejects the change or the
    /// file cannot be written. The cached snapshot is unchanged on failure.
    pub fn update<F>(&self, mutate: F) -> Result<Arc<Config>, ConfigError>
    where
        F: FnOnce(&mut Config) -> Result<(), ConfigError>,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ConfigError::Io("config write lock poisoned".to_string()))?;
        let mut next = (*self.snapshot()).clone();
        mutate(&mut next)?;
        let modified_at = match &self.path {
            Some(path) => {
                write_config(path, &next)?;
                modified_time(path)
            }
            None => None,
        };
        let next = Arc::new(next);
        let mut cached = self
            .cached
            .write()
            .map_err(|_| ConfigError::Io("config cache poisoned".to_string()))?;
        cached.config = Arc::clone(&next);
        cached.modified_at = modified_at;
        Ok(next)
    }

    /// Merges a JSON patch (typically from the management surface).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the patch is invalid or persistence fails.
    pub fn merge(&self, patch: &Value) -> Result<Arc<Config>, ConfigError> {
        self.update(|config| config.merge(patch))
    }

    /// Records or clears an explicit tool override.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when persistence fails.
    pub fn set_tool_override(
        &self,
        name: &str,
        enabled: Option<bool>,
    ) -> Result<Arc<Config>, ConfigError> {
        self.update(|config| {
            config.set_tool_override(name, enabled);
            Ok(())
        })
    }

    /// Returns the redacted configuration.
    #[must_use]
    pub fn redacted(&self) -> Value {
        self.snapshot().redacted()
    }

    /// Re-reads the backing file, keeping the old snapshot on failure.
    fn refresh(&self, path: &Path) {
        let Ok(mut cached) = self.cached.write() else {
            return;
        };
        match read_config(path) {
            Ok(Some((config, modified_at))) => {
                cached.config = Arc::new(config);
                cached.modified_at = modified_at;
            }
            Ok(None) => {
                cached.config = Arc::new(Config::default());
                cached.modified_at = None;
            }
            Err(_) => {
                cached.modified_at = modified_time(path);
            }
        }
    }
}

// ============================================================================
// SECTION: File Helpers
// ============================================================================

/// Returns the modification time for a path, if it exists.
fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// Reads and parses the configuration file; `None` when it does not exist.
fn read_config(path: &Path) -> Result<Option<(Config, Option<SystemTime>)>, ConfigError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(ConfigError::Io(err.to_string())),
    };
    if bytes.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
    }
    let content = std::str::from_utf8(&bytes)
        .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
    let config = Config::from_toml(content)?;
    Ok(Some((config, modified_time(path))))
}

/// Writes configuration through a temporary file and rename.
fn write_config(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let rendered = config.to_toml()?;
    if rendered.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid("config exceeds size limit".to_string()));
    }
    let parent = path.parent().filter(|parent| !parent.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent).map_err(|err| ConfigError::Io(err.to_string()))?;
    }
    let (temp_path, mut file) = create_temp_file(path)?;
    let written = file
        .write_all(rendered.as_bytes())
        .and_then(|()| file.sync_all())
        .and_then(|()| fs::rename(&temp_path, path));
    if let Err(err) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(ConfigError::Io(err.to_string()));
    }
    Ok(())
}

/// Creates a unique temporary file alongside the destination.
fn create_temp_file(path: &Path) -> Result<(PathBuf, fs::File), ConfigError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            ConfigError::Invalid("config path does not include a file name".to_string())
        })?;
    for _ in 0 .. TEMP_ATTEMPTS {
        let attempt = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_name = format!(".{file_name}.tmp.{}.{attempt}", std::process::id());
        let temp_path = parent.join(temp_name);
        match OpenOptions::new().write(true).create_new(true).open(&temp_path) {
            Ok(file) => return Ok((temp_path, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(ConfigError::Io(err.to_string())),
        }
    }
    Err(ConfigError::Io("failed to allocate temporary config path".to_string()))
}
