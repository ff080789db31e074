// crates/toolhub-update/src/replace.rs
// ============================================================================
// Module: Atomic Replace
// Description: Backup-first executable replacement with rollback.
// Purpose: Swap in a staged binary without ever losing the installed one.
// Dependencies: std
// ============================================================================

//! ## Overview
//! The staged binary must live in the install directory so every step is a
//! same-filesystem rename:
//!
//! 1. rename the installed binary to `<name>.bak`,
//! 2. rename the staged binary onto the install path,
//! 3. remove the backup.
//!
//! When step 2 fails the backup is renamed back. Filesystem calls go through
//! [`ReplaceOps`] so failure paths can be exercised in tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use crate::error::UpdateError;

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Filesystem operations used by the replace step.
pub trait ReplaceOps: Send + Sync {
    /// Returns true when a file exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Renames `from` to `to`, replacing `to` when present.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Removes a file.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// Real filesystem operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsOps;

impl ReplaceOps for FsOps {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

// ============================================================================
// SECTION: Replace
// ============================================================================

/// Returns the backup path used while replacing `install`.
#[must_use]
pub fn backup_path(install: &Path) -> PathBuf {
    let mut name = install.file_name().map_or_else(OsString::new, OsString::from);
    name.push(".bak");
    install.with_file_name(name)
}

/// Moves `staged` onto `install`, keeping a backup until the swap succeeds.
///
/// # Errors
///
/// Returns [`UpdateError::RolledBack`] when the swap failed and the previous
/// binary was restored, or [`UpdateError::Replace`] when the backup could not
/// be taken or restored.
pub fn atomic_replace(
    ops: &dyn ReplaceOps,
    staged: &Path,
    install: &Path,
) -> Result<(), UpdateError> {
    let backup = backup_path(install);
    let had_install = ops.exists(install);
    if had_install {
        if ops.exists(&backup) {
            ops.remove_file(&backup).map_err(|err| {
                discard(ops, staged);
                UpdateError::Replace(format!("removing stale backup failed: {err}"))
            })?;
        }
        ops.rename(install, &backup).map_err(|err| {
            discard(ops, staged);
            UpdateError::Replace(format!("backing up installed binary failed: {err}"))
        })?;
    }
    if let Err(err) = ops.rename(staged, install) {
        discard(ops, staged);
        if !had_install {
            return Err(UpdateError::Replace(format!("installing binary failed: {err}")));
        }
        return match ops.rename(&backup, install) {
            Ok(()) => Err(UpdateError::RolledBack(err.to_string())),
            Err(restore) => Err(UpdateError::Replace(format!(
                "installing binary failed: {err}; restoring {} failed: {restore}",
                backup.display()
            ))),
        };
    }
    if had_install {
        let _ = ops.remove_file(&backup);
    }
    Ok(())
}

/// Best-effort removal of the staged file.
fn discard(ops: &dyn ReplaceOps, staged: &Path) {
    let _ = ops.remove_file(staged);
}
