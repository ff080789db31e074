// crates/toolhub-update/src/manager.rs
// ============================================================================
// Module: Update Manager
// Description: Release checks, verified downloads, and binary replacement.
// Purpose: Drive the self-update state machine for CLI and tool callers.
// Dependencies: reqwest, tokio, url
// ============================================================================

//! ## Overview
//! [`UpdateManager`] walks `Checking -> UpToDate | UpdateAvailable ->
//! Downloading -> Verifying -> Replacing -> Done`, reporting each phase to an
//! [`UpdateObserver`]. A failed swap reports `RolledBack` before the error is
//! returned.
//!
//! ## Invariants
//! - The candidate binary is staged in the install directory.
//! - A checksum mismatch deletes the staged file before any rename happens.
//! - A missing or unreachable manifest skips verification instead of failing.
//! - At most one update runs per manager at a time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Serialize;
use tokio::fs::File;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::checksum::StreamDigest;
use crate::checksum::parse_manifest;
use crate::error::UpdateError;
use crate::platform::Platform;
use crate::release::Release;
use crate::release::UpdateCheck;
use crate::release::UpdateInfo;
use crate::release::evaluate;
use crate::replace::FsOps;
use crate::replace::ReplaceOps;
use crate::replace::atomic_replace;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Release descriptor consulted when no override is configured.
pub const DEFAULT_RELEASE_URL: &str =
    "https://api.github.com/repos/toolhub-dev/toolhub/releases/latest";
/// Maximum binary download size.
pub const MAX_DOWNLOAD_BYTES: u64 = 256 * 1024 * 1024;
/// Maximum size of release metadata and checksum manifests.
const MAX_METADATA_BYTES: usize = 1024 * 1024;
/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// User agent sent with every request.
const USER_AGENT: &str = concat!("toolhub/", env!("CARGO_PKG_VERSION"));
/// Attempts made to allocate a unique staging file.
const STAGING_ATTEMPTS: usize = 16;
/// Counter used to build unique staging file names.
static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// SECTION: Phases
// ============================================================================

/// Update state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePhase {
    /// Fetching release metadata.
    Checking,
    /// Running version is current.
    UpToDate,
    /// A newer release exists.
    UpdateAvailable,
    /// Streaming the binary.
    Downloading,
    /// Checking the published digest.
    Verifying,
    /// Swapping binaries.
    Replacing,
    /// New binary installed.
    Done,
    /// Swap failed and the previous binary was restored.
    RolledBack,
}

impl UpdatePhase {
    /// Returns the phase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::UpToDate => "up_to_date",
            Self::UpdateAvailable => "update_available",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::Replacing => "replacing",
            Self::Done => "done",
            Self::RolledBack => "rolled_back",
        }
    }
}

/// Receives phase transitions.
pub trait UpdateObserver: Send + Sync {
    /// Called on entering `phase`.
    fn on_phase(&self, phase: UpdatePhase, detail: &str);
}

impl<F> UpdateObserver for F
where
    F: Fn(UpdatePhase, &str) + Send + Sync,
{
    fn on_phase(&self, phase: UpdatePhase, detail: &str) {
        self(phase, detail);
    }
}

/// Observer that ignores every phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl UpdateObserver for NoopObserver {
    fn on_phase(&self, _phase: UpdatePhase, _detail: &str) {}
}

/// Result of a full check-and-apply run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// Nothing to do.
    UpToDate {
        /// Running version.
        current_version: String,
    },
    /// A new binary was installed.
    Updated {
        /// Previous version.
        from: String,
        /// Installed version.
        to: String,
    },
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Update manager settings.
#[derive(Debug, Clone)]
pub struct UpdateManagerConfig {
    /// Release descriptor URL.
    pub release_url: String,
    /// Allow cleartext `http://` endpoints.
    pub allow_http: bool,
    /// Running version.
    pub current_version: String,
    /// Executable to replace.
    pub install_path: PathBuf,
    /// Platform override; detected from the build target when `None`.
    pub platform: Option<Platform>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum binary size.
    pub max_download_bytes: u64,
}

impl UpdateManagerConfig {
    /// Settings with default endpoint and limits.
    #[must_use]
    pub fn new(current_version: impl Into<String>, install_path: impl Into<PathBuf>) -> Self {
        Self {
            release_url: DEFAULT_RELEASE_URL.to_string(),
            allow_http: false,
            current_version: current_version.into(),
            install_path: install_path.into(),
            platform: None,
            timeout: REQUEST_TIMEOUT,
            max_download_bytes: MAX_DOWNLOAD_BYTES,
        }
    }
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Self-update driver.
pub struct UpdateManager {
    /// Settings.
    config: UpdateManagerConfig,
    /// HTTP client.
    client: Client,
    /// Filesystem operations for the swap.
    ops: Arc<dyn ReplaceOps>,
    /// Set while an update is running.
    in_progress: AtomicBool,
}

impl UpdateManager {
    /// Builds a manager.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError`] when the release URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: UpdateManagerConfig) -> Result<Self, UpdateError> {
        validate_url(&config.release_url, config.allow_http)?;
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| UpdateError::Http(err.to_string()))?;
        Ok(Self {
            config,
            client,
            ops: Arc::new(FsOps),
            in_progress: AtomicBool::new(false),
        })
    }

    /// Replaces the filesystem operations used for the swap.
    #[must_use]
    pub fn with_ops(mut self, ops: Arc<dyn ReplaceOps>) -> Self {
        self.ops = ops;
        self
    }

    /// Returns the running version.
    #[must_use]
    pub fn current_version(&self) -> &str {
        &self.config.current_version
    }

    /// Returns the executable this manager replaces.
    #[must_use]
    pub fn install_path(&self) -> &Path {
        &self.config.install_path
    }

    /// Returns true while an update is running.
    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Fetches release metadata and compares it with the running version.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError`] for unsupported platforms, HTTP failures, or a
    /// malformed release.
    pub async fn check(&self, observer: &dyn UpdateObserver) -> Result<UpdateCheck, UpdateError> {
        observer.on_phase(UpdatePhase::Checking, &self.config.release_url);
        let platform = match self.config.platform {
            Some(platform) => platform,
            None => Platform::current()?,
        };
        let body = self.fetch(&self.config.release_url, MAX_METADATA_BYTES).await?;
        let release: Release = serde_json::from_slice(&body)
            .map_err(|err| UpdateError::Release(format!("invalid release descriptor: {err}")))?;
        let check = evaluate(&self.config.current_version, &release, platform)?;
        match &check {
            UpdateCheck::UpToDate {
                current_version, ..
            } => observer.on_phase(UpdatePhase::UpToDate, current_version),
            UpdateCheck::Available(info) => {
                observer.on_phase(UpdatePhase::UpdateAvailable, &info.latest_version);
            }
        }
        Ok(check)
    }

    /// Downloads, verifies, and installs an available update.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError`] when another update is running, the download
    /// or checksum fails, or the swap fails.
    pub async fn apply(
        &self,
        info: &UpdateInfo,
        observer: &dyn UpdateObserver,
    ) -> Result<(), UpdateError> {
        let _guard = ProgressGuard::acquire(&self.in_progress)?;

        observer.on_phase(UpdatePhase::Downloading, &info.download_url);
        let (staged, digest) = self.download(&info.download_url).await?;

        observer.on_phase(UpdatePhase::Verifying, &info.asset_name);
        let prepared = match self.verify(info, &digest, observer).await {
            Ok(()) => make_executable(&staged).await,
            Err(err) => Err(err),
        };
        if let Err(err) = prepared {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(err);
        }

        observer.on_phase(UpdatePhase::Replacing, &self.config.install_path.to_string_lossy());
        match atomic_replace(self.ops.as_ref(), &staged, &self.config.install_path) {
            Ok(()) => {
                observer.on_phase(UpdatePhase::Done, &info.latest_version);
                Ok(())
            }
            Err(err @ UpdateError::RolledBack(_)) => {
                observer.on_phase(UpdatePhase::RolledBack, &err.to_string());
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Checks for a newer release and installs it when found.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError`] from either step.
    pub async fn update(
        &self,
        observer: &dyn UpdateObserver,
    ) -> Result<UpdateOutcome, UpdateError> {
        match self.check(observer).await? {
            UpdateCheck::UpToDate {
                current_version, ..
            } => Ok(UpdateOutcome::UpToDate {
                current_version,
            }),
            UpdateCheck::Available(info) => {
                self.apply(&info, observer).await?;
                Ok(UpdateOutcome::Updated {
                    from: info.current_version,
                    to: info.latest_version,
                })
            }
        }
    }

    /// Compares the staged digest with the published manifest entry.
    async fn verify(
        &self,
        info: &UpdateInfo,
        digest: &str,
        observer: &dyn UpdateObserver,
    ) -> Result<(), UpdateError> {
        let Some(url) = &info.checksums_url else {
            observer.on_phase(UpdatePhase::Verifying, "no checksum manifest published; skipped");
            return Ok(());
        };
        let Ok(body) = self.fetch(url, MAX_METADATA_BYTES).await else {
            observer.on_phase(UpdatePhase::Verifying, "checksum manifest unreachable; skipped");
            return Ok(());
        };
        let manifest = parse_manifest(&String::from_utf8_lossy(&body));
        let Some(expected) = manifest.get(&info.asset_name) else {
            observer.on_phase(UpdatePhase::Verifying, "no checksum entry for asset; skipped");
            return Ok(());
        };
        if expected != digest {
            return Err(UpdateError::ChecksumMismatch {
                asset: info.asset_name.clone(),
                expected: expected.clone(),
                actual: digest.to_string(),
            });
        }
        observer.on_phase(UpdatePhase::Verifying, "checksum verified");
        Ok(())
    }

    /// Streams a binary into a staging file, returning its path and digest.
    async fn download(&self, url: &str) -> Result<(PathBuf, String), UpdateError> {
        let (staged, file) = create_staging_file(&self.config.install_path).await?;
        match self.stream_into(url, file).await {
            Ok(digest) => Ok((staged, digest)),
            Err(err) => {
                let _ = tokio::fs::remove_file(&staged).await;
                Err(err)
            }
        }
    }

    /// Writes the response body to `file` while hashing and size-checking it.
    async fn stream_into(&self, url: &str, mut file: File) -> Result<String, UpdateError> {
        let limit = self.config.max_download_bytes;
        let mut response = self.get(url).await?;
        if response.content_length().is_some_and(|length| length > limit) {
            return Err(UpdateError::TooLarge {
                limit,
            });
        }
        let mut digest = StreamDigest::default();
        let mut total: u64 = 0;
        while let Some(chunk) =
            response.chunk().await.map_err(|err| UpdateError::Http(err.to_string()))?
        {
            total = total.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
            if total > limit {
                return Err(UpdateError::TooLarge {
                    limit,
                });
            }
            digest.update(&chunk);
            file.write_all(&chunk).await.map_err(|err| UpdateError::Io(err.to_string()))?;
        }
        if total == 0 {
            return Err(UpdateError::Http(format!("empty download from {url}")));
        }
        file.flush().await.map_err(|err| UpdateError::Io(err.to_string()))?;
        file.sync_all().await.map_err(|err| UpdateError::Io(err.to_string()))?;
        Ok(digest.finish())
    }

    /// Fetches a small document with a hard size limit.
    async fn fetch(&self, url: &str, limit: usize) -> Result<Vec<u8>, UpdateError> {
        let mut response = self.get(url).await?;
        let mut body = Vec::new();
        while let Some(chunk) =
            response.chunk().await.map_err(|err| UpdateError::Http(err.to_string()))?
        {
            if body.len().saturating_add(chunk.len()) > limit {
                return Err(UpdateError::Http(format!(
                    "response from {url} exceeds {limit} bytes"
                )));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    /// Issues a GET and rejects non-success statuses.
    async fn get(&self, url: &str) -> Result<reqwest::Response, UpdateError> {
        let url = validate_url(url, self.config.allow_http)?;
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json, application/octet-stream, */*")
            .send()
            .await
            .map_err(|err| UpdateError::Http(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Http(format!(
                "GET {} returned status {}",
                response.url(),
                status.as_u16()
            )));
        }
        Ok(response)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Clears the in-progress flag when dropped.
struct ProgressGuard<'a> {
    /// Flag owned by the manager.
    flag: &'a AtomicBool,
}

impl<'a> ProgressGuard<'a> {
    /// Claims the flag or reports a running update.
    fn acquire(flag: &'a AtomicBool) -> Result<Self, UpdateError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| UpdateError::InProgress)?;
        Ok(Self {
            flag,
        })
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Parses a URL and enforces the scheme policy.
fn validate_url(raw: &str, allow_http: bool) -> Result<Url, UpdateError> {
    let url = Url::parse(raw).map_err(|err| UpdateError::InvalidUrl(format!("{raw}: {err}")))?;
    match url.scheme() {
        "https" => Ok(url),
        "http" if allow_http => Ok(url),
        "http" => Err(UpdateError::InvalidUrl(format!("{raw}: cleartext http is not allowed"))),
        other => Err(UpdateError::InvalidUrl(format!("{raw}: unsupported scheme {other}"))),
    }
}

/// Creates a unique staging file in the install directory.
async fn create_staging_file(install: &Path) -> Result<(PathBuf, File), UpdateError> {
    let dir = install
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = install.file_name().and_then(|name| name.to_str()).ok_or_else(|| {
        UpdateError::Io(format!("install path {} has no file name", install.display()))
    })?;
    for _ in 0 .. STAGING_ATTEMPTS {
        let attempt = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
        let staged = dir.join(format!(".{name}.download.{}.{attempt}", std::process::id()));
        match OpenOptions::new().write(true).create_new(true).open(&staged).await {
            Ok(file) => return Ok((staged, file)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(err) => return Err(UpdateError::Io(format!("{}: {err}", staged.display()))),
        }
    }
    Err(UpdateError::Io("failed to allocate staging file".to_string()))
}

/// Marks the staged binary executable.
#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<(), UpdateError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|err| UpdateError::Io(err.to_string()))
}

/// Marks the staged binary executable.
#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<(), UpdateError> {
    Ok(())
}
