// crates/toolhub-update/src/platform.rs
// ============================================================================
// Module: Release Platforms
// Description: Maps the running OS/architecture onto a release asset name.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Releases publish one binary per supported pair: Linux or macOS on x64 or
//! arm64. Any other pair is a hard failure before anything is fetched.

use std::env::consts;

use crate::error::UpdateError;

/// Asset name prefix shared by every platform binary.
pub const ASSET_PREFIX: &str = "toolhub";

/// Supported operating systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    /// Linux.
    Linux,
    /// macOS.
    Darwin,
}

/// Supported CPU architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    /// `x86_64`.
    X64,
    /// `aarch64`.
    Arm64,
}

/// Supported OS/architecture pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    /// Operating system.
    pub os: Os,
    /// CPU architecture.
    pub arch: Arch,
}

impl Platform {
    /// Resolves the platform this binary was built for.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::UnsupportedPlatform`] outside the known pairs.
    pub fn current() -> Result<Self, UpdateError> {
        Self::from_parts(consts::OS, consts::ARCH)
    }

    /// Resolves a platform from Rust target labels.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::UnsupportedPlatform`] outside the known pairs.
    pub fn from_parts(os: &str, arch: &str) -> Result<Self, UpdateError> {
        let unsupported = || UpdateError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        };
        let os_kind = match os {
            "linux" => Os::Linux,
            "macos" | "darwin" => Os::Darwin,
            _ => return Err(unsupported()),
        };
        let arch_kind = match arch {
            "x86_64" | "x64" => Arch::X64,
            "aarch64" | "arm64" => Arch::Arm64,
            _ => return Err(unsupported()),
        };
        Ok(Self {
            os: os_kind,
            arch: arch_kind,
        })
    }

    /// Returns the release asset name, e.g. `toolhub-linux-x64`.
    #[must_use]
    pub fn asset_name(&self) -> String {
        let os = match self.os {
            Os::Linux => "linux",
            Os::Darwin => "darwin",
        };
        let arch = match self.arch {
            Arch::X64 => "x64",
            Arch::Arm64 => "arm64",
        };
        format!("{ASSET_PREFIX}-{os}-{arch}")
    }
}
