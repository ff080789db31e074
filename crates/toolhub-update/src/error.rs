// crates/toolhub-update/src/error.rs
// ============================================================================
// Module: Update Errors
// Description: Failure taxonomy for release checks and binary replacement.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every failure is surfaced to the caller; only a missing checksum manifest
//! degrades silently, and that path never produces an error.

use thiserror::Error;

/// Self-update failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// The running OS/architecture has no published asset.
    #[error("unsupported platform: {os}/{arch}")]
    UnsupportedPlatform {
        /// Operating system label.
        os: String,
        /// CPU architecture label.
        arch: String,
    },
    /// Endpoint URL rejected.
    #[error("invalid update url: {0}")]
    InvalidUrl(String),
    /// HTTP request failed or returned a non-success status.
    #[error("http error: {0}")]
    Http(String),
    /// Release descriptor is malformed or lacks the platform asset.
    #[error("invalid release: {0}")]
    Release(String),
    /// Download exceeded the size cap.
    #[error("download exceeds {limit} bytes")]
    TooLarge {
        /// Maximum accepted size.
        limit: u64,
    },
    /// Downloaded bytes do not match the published checksum.
    #[error("checksum mismatch for {asset}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Asset name.
        asset: String,
        /// Published digest.
        expected: String,
        /// Computed digest.
        actual: String,
    },
    /// Local filesystem failure before replacement began.
    #[error("io error: {0}")]
    Io(String),
    /// Replacement failed and the previous binary was restored.
    #[error("replace failed, previous binary restored: {0}")]
    RolledBack(String),
    /// Replacement failed and the previous binary could not be restored.
    #[error("replace failed: {0}")]
    Replace(String),
    /// Another update is already running in this process.
    #[error("an update is already in progress")]
    InProgress,
}
