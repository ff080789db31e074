// crates/toolhub-update/src/lib.rs
// ============================================================================
// Module: Toolhub Update
// Description: Self-update for the Toolhub executable.
// Purpose: Check releases and replace the running binary safely.
// Dependencies: reqwest, sha2, tokio, url
// ============================================================================

//! ## Overview
//! Toolhub Update compares the running version with the latest published
//! release, downloads the platform binary next to the install path, verifies
//! it against the release checksum manifest when one is published, and swaps
//! it in with a backup-first rename sequence that rolls back on failure.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod checksum;
pub mod error;
pub mod manager;
pub mod platform;
pub mod release;
pub mod replace;
pub mod version;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use checksum::CHECKSUM_ASSET;
pub use checksum::parse_manifest;
pub use checksum::sha256_hex;
pub use error::UpdateError;
pub use manager::DEFAULT_RELEASE_URL;
pub use manager::NoopObserver;
pub use manager::UpdateManager;
pub use manager::UpdateManagerConfig;
pub use manager::UpdateObserver;
pub use manager::UpdateOutcome;
pub use manager::UpdatePhase;
pub use platform::Platform;
pub use release::Release;
pub use release::ReleaseAsset;
pub use release::UpdateCheck;
pub use release::UpdateInfo;
pub use replace::FsOps;
pub use replace::ReplaceOps;
pub use replace::atomic_replace;
pub use replace::backup_path;
pub use version::Version;
