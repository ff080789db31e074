// crates/toolhub-update/tests/update_flow.rs
// ============================================================================
// Module: Update Flow Tests
// Description: Check, download, verify, and replace against a local server.
// ============================================================================

//! End-to-end update runs against a loopback release server.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions."
)]

mod common;

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::PhaseLog;
use common::ReleaseServer;
use common::Route;
use common::config;
use common::manager;
use toolhub_update::FsOps;
use toolhub_update::NoopObserver;
use toolhub_update::ReplaceOps;
use toolhub_update::UpdateCheck;
use toolhub_update::UpdateError;
use toolhub_update::UpdateManager;
use toolhub_update::UpdateOutcome;
use toolhub_update::UpdatePhase;
use toolhub_update::sha256_hex;

const NEW_BINARY: &[u8] = b"#!/bin/sh\necho toolhub 1.3.0\n";

fn install_old(dir: &Path) -> std::path::PathBuf {
    let install = dir.join("toolhub");
    fs::write(&install, b"old binary").unwrap();
    install
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn manifest_for(body: &[u8]) -> String {
    let other = sha256_hex(b"x");
    format!("{}  toolhub-linux-x64\n{other}  toolhub-darwin-arm64\n", sha256_hex(body))
}

#[tokio::test(flavor = "multi_thread")]
async fn same_version_reports_no_update() {
    let server = ReleaseServer::start();
    server.publish("v1.2.3", NEW_BINARY, None);
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&server, "1.2.3", &install_old(dir.path()));

    let check = manager.check(&NoopObserver).await.unwrap();
    assert!(matches!(check, UpdateCheck::UpToDate { .. }));
    let outcome = manager.update(&NoopObserver).await.unwrap();
    assert_eq!(
        outcome,
        UpdateOutcome::UpToDate {
            current_version: "1.2.3".to_string()
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn newer_release_is_reported() {
    let server = ReleaseServer::start();
    server.publish("v1.3.0", NEW_BINARY, None);
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&server, "1.2.3", &install_old(dir.path()));

    let UpdateCheck::Available(info) = manager.check(&NoopObserver).await.unwrap() else {
        panic!("expected an update");
    };
    assert_eq!(info.latest_version, "1.3.0");
    assert_eq!(info.asset_name, "toolhub-linux-x64");
    assert!(info.checksums_url.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn verified_update_replaces_binary() {
    let server = ReleaseServer::start();
    server.publish("v1.3.0", NEW_BINARY, Some(manifest_for(NEW_BINARY)));
    let dir = tempfile::tempdir().unwrap();
    let install = install_old(dir.path());
    let manager = manager(&server, "1.2.3", &install);
    let log = PhaseLog::default();

    let outcome = manager.update(&log).await.unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::Updated {
            from: "1.2.3".to_string(),
            to: "1.3.0".to_string()
        }
    );
    assert_eq!(fs::read(&install).unwrap(), NEW_BINARY);
    assert_eq!(entries(dir.path()), vec!["toolhub"]);
    assert_eq!(
        log.kinds(),
        vec![
            UpdatePhase::Checking,
            UpdatePhase::UpdateAvailable,
            UpdatePhase::Downloading,
            UpdatePhase::Verifying,
            UpdatePhase::Replacing,
            UpdatePhase::Done,
        ]
    );
    assert!(log.phases.lock().unwrap().iter().any(|(_, detail)| detail == "checksum verified"));
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&install).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
    assert!(!manager.is_updating());
}

#[tokio::test(flavor = "multi_thread")]
async fn checksum_mismatch_leaves_install_untouched() {
    let server = ReleaseServer::start();
    server.publish("v1.3.0", NEW_BINARY, Some(manifest_for(b"something else")));
    let dir = tempfile::tempdir().unwrap();
    let install = install_old(dir.path());
    let manager = manager(&server, "1.2.3", &install);
    let log = PhaseLog::default();

    let err = manager.update(&log).await.unwrap_err();

    assert!(matches!(err, UpdateError::ChecksumMismatch { .. }));
    assert_eq!(fs::read(&install).unwrap(), b"old binary");
    assert_eq!(entries(dir.path()), vec!["toolhub"]);
    assert!(!log.kinds().contains(&UpdatePhase::Replacing));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_manifest_skips_verification() {
    let server = ReleaseServer::start();
    server.publish("v1.3.0", NEW_BINARY, None);
    let dir = tempfile::tempdir().unwrap();
    let install = install_old(dir.path());

    manager(&server, "1.2.3", &install).update(&NoopObserver).await.unwrap();
    assert_eq!(fs::read(&install).unwrap(), NEW_BINARY);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_manifest_skips_verification() {
    let server = ReleaseServer::start();
    server.publish("v1.3.0", NEW_BINARY, Some(manifest_for(b"ignored")));
    server.route("/download/checksums.txt", Route::status(503));
    let dir = tempfile::tempdir().unwrap();
    let install = install_old(dir.path());

    manager(&server, "1.2.3", &install).update(&NoopObserver).await.unwrap();
    assert_eq!(fs::read(&install).unwrap(), NEW_BINARY);
}

#[tokio::test(flavor = "multi_thread")]
async fn manifest_without_entry_skips_verification() {
    let server = ReleaseServer::start();
    let manifest = format!("{}  toolhub-darwin-x64\n", sha256_hex(b"other"));
    server.publish("v1.3.0", NEW_BINARY, Some(manifest));
    let dir = tempfile::tempdir().unwrap();
    let install = install_old(dir.path());

    manager(&server, "1.2.3", &install).update(&NoopObserver).await.unwrap();
    assert_eq!(fs::read(&install).unwrap(), NEW_BINARY);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_download_leaves_install_untouched() {
    let server = ReleaseServer::start();
    server.publish("v1.3.0", NEW_BINARY, None);
    server.route("/download/toolhub-linux-x64", Route::status(500));
    let dir = tempfile::tempdir().unwrap();
    let install = install_old(dir.path());

    let err = manager(&server, "1.2.3", &install).update(&NoopObserver).await.unwrap_err();

    assert!(matches!(err, UpdateError::Http(_)));
    assert_eq!(fs::read(&install).unwrap(), b"old binary");
    assert_eq!(entries(dir.path()), vec!["toolhub"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_download_is_rejected() {
    let server = ReleaseServer::start();
    server.publish("v1.3.0", NEW_BINARY, None);
    let dir = tempfile::tempdir().unwrap();
    let install = install_old(dir.path());
    let mut settings = config(&server, "1.2.3", &install);
    settings.max_download_bytes = 4;
    let manager = UpdateManager::new(settings).unwrap();

    let err = manager.update(&NoopObserver).await.unwrap_err();

    assert_eq!(
        err,
        UpdateError::TooLarge {
            limit: 4
        }
    );
    assert_eq!(entries(dir.path()), vec!["toolhub"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn second_concurrent_update_is_rejected() {
    let server = ReleaseServer::start();
    server.publish("v1.3.0", NEW_BINARY, None);
    server.route(
        "/download/toolhub-linux-x64",
        Route::ok(NEW_BINARY.to_vec()).delayed(Duration::from_millis(500)),
    );
    let dir = tempfile::tempdir().unwrap();
    let install = install_old(dir.path());
    let manager = Arc::new(manager(&server, "1.2.3", &install));
    let UpdateCheck::Available(info) = manager.check(&NoopObserver).await.unwrap() else {
        panic!("expected an update");
    };

    let first = {
        let manager = Arc::clone(&manager);
        let info = info.clone();
        tokio::spawn(async move { manager.apply(&info, &NoopObserver).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(manager.is_updating());
    let second = manager.apply(&info, &NoopObserver).await;

    assert_eq!(second, Err(UpdateError::InProgress));
    first.await.unwrap().unwrap();
    assert_eq!(fs::read(&install).unwrap(), NEW_BINARY);
}

/// Filesystem operations that refuse to move the staged download.
struct RefuseStagedRename;

impl ReplaceOps for RefuseStagedRename {
    fn exists(&self, path: &Path) -> bool {
        FsOps.exists(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let staged = from
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with(".toolhub.download"));
        if staged {
            return Err(io::Error::other("disk full"));
        }
        FsOps.rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        FsOps.remove_file(path)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_swap_rolls_back_to_previous_binary() {
    let server = ReleaseServer::start();
    server.publish("v1.3.0", NEW_BINARY, Some(manifest_for(NEW_BINARY)));
    let dir = tempfile::tempdir().unwrap();
    let install = install_old(dir.path());
    let manager = manager(&server, "1.2.3", &install).with_ops(Arc::new(RefuseStagedRename));
    let log = PhaseLog::default();

    let err = manager.update(&log).await.unwrap_err();

    assert!(matches!(err, UpdateError::RolledBack(_)));
    assert_eq!(fs::read(&install).unwrap(), b"old binary");
    assert_eq!(entries(dir.path()), vec!["toolhub"]);
    assert!(log.kinds().contains(&UpdatePhase::RolledBack));
    assert!(!log.kinds().contains(&UpdatePhase::Done));
}

#[test]
fn cleartext_release_url_requires_opt_in() {
    let server = ReleaseServer::start();
    let dir = tempfile::tempdir().unwrap();
    let mut settings = config(&server, "1.2.3", &install_old(dir.path()));
    settings.allow_http = false;
    assert!(matches!(UpdateManager::new(settings), Err(UpdateError::InvalidUrl(_))));
}
