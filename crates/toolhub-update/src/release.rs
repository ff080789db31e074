// crates/toolhub-update/src/release.rs
// ============================================================================
// Module: Release Descriptors
// Description: Release metadata model and update evaluation.
// Purpose: Decide whether a remote release is newer and which asset to fetch.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A release descriptor carries a tag and named assets. Evaluation compares
//! the tag with the running version and, when the release is strictly newer,
//! picks the asset matching the current platform. A fresh [`UpdateInfo`] is
//! built on every check; nothing is cached.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::checksum::CHECKSUM_ASSET;
use crate::error::UpdateError;
use crate::platform::Platform;
use crate::version::Version;

// ============================================================================
// SECTION: Model
// ============================================================================

/// Remote release descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Version tag, e.g. `v1.3.0`.
    pub tag_name: String,
    /// Published assets.
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// Downloadable release asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    /// Asset file name.
    pub name: String,
    /// Direct download URL.
    pub browser_download_url: String,
}

impl Release {
    /// Returns the asset with the given name.
    #[must_use]
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}

/// Available update for the running platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateInfo {
    /// Running version.
    pub current_version: String,
    /// Newer release version.
    pub latest_version: String,
    /// Binary download URL.
    pub download_url: String,
    /// Platform asset name.
    pub asset_name: String,
    /// Checksum manifest URL, when published.
    pub checksums_url: Option<String>,
}

/// Result of comparing the running version with a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateCheck {
    /// The release is not newer than the running version.
    UpToDate {
        /// Running version.
        current_version: String,
        /// Release version.
        latest_version: String,
    },
    /// A newer release exists.
    Available(UpdateInfo),
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Compares `release` with `current` and selects the platform asset.
///
/// # Errors
///
/// Returns [`UpdateError::Release`] when a newer release lacks the asset for
/// `platform`.
pub fn evaluate(
    current: &str,
    release: &Release,
    platform: Platform,
) -> Result<UpdateCheck, UpdateError> {
    let running = Version::parse(current);
    let latest = Version::parse(&release.tag_name);
    if !latest.is_newer_than(&running) {
        return Ok(UpdateCheck::UpToDate {
            current_version: running.to_string(),
            latest_version: latest.to_string(),
        });
    }
    let asset_name = platform.asset_name();
    let asset = release.asset(&asset_name).ok_or_else(|| {
        UpdateError::Release(format!("release {} has no asset {asset_name}", release.tag_name))
    })?;
    Ok(UpdateCheck::Available(UpdateInfo {
        current_version: running.to_string(),
        latest_version: latest.to_string(),
        download_url: asset.browser_download_url.clone(),
        asset_name,
        checksums_url: release
            .asset(CHECKSUM_ASSET)
            .map(|manifest| manifest.browser_download_url.clone()),
    }))
}

#[cfg(test)]
mod tests;
