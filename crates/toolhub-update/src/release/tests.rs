// crates/toolhub-update/src/release/tests.rs
// ============================================================================
// Module: Release Evaluation Unit Tests
// Description: Newer-than checks and platform asset selection.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions."
)]

use super::Release;
use super::ReleaseAsset;
use super::UpdateCheck;
use super::evaluate;
use crate::error::UpdateError;
use crate::platform::Platform;

fn release(tag: &str) -> Release {
    let asset = |name: &str| ReleaseAsset {
        name: name.to_string(),
        browser_download_url: format!("https://downloads.example.test/{name}"),
    };
    Release {
        tag_name: tag.to_string(),
        assets: vec![
            asset("toolhub-linux-x64"),
            asset("toolhub-darwin-arm64"),
            asset("checksums.txt"),
        ],
    }
}

fn linux() -> Platform {
    Platform::from_parts("linux", "x86_64").unwrap()
}

#[test]
fn same_version_is_up_to_date() {
    let check = evaluate("1.2.3", &release("v1.2.3"), linux()).unwrap();
    assert!(matches!(check, UpdateCheck::UpToDate { .. }));
}

#[test]
fn older_release_is_up_to_date() {
    let check = evaluate("1.2.3", &release("v1.1.9"), linux()).unwrap();
    assert!(matches!(check, UpdateCheck::UpToDate { .. }));
}

#[test]
fn newer_release_names_platform_asset() {
    let check = evaluate("1.2.3", &release("v1.3.0"), linux()).unwrap();
    let UpdateCheck::Available(info) = check else {
        panic!("expected update");
    };
    assert_eq!(info.latest_version, "1.3.0");
    assert_eq!(info.current_version, "1.2.3");
    assert_eq!(info.asset_name, "toolhub-linux-x64");
    assert_eq!(info.download_url, "https://downloads.example.test/toolhub-linux-x64");
    assert_eq!(
        info.checksums_url.as_deref(),
        Some("https://downloads.example.test/checksums.txt")
    );
}

#[test]
fn newer_release_without_platform_asset_fails() {
    let platform = Platform::from_parts("macos", "x86_64").unwrap();
    let err = evaluate("1.2.3", &release("v2.0.0"), platform).unwrap_err();
    assert!(matches!(err, UpdateError::Release(_)));
}

#[test]
fn unknown_platforms_are_rejected() {
    let err = Platform::from_parts("windows", "x86_64").unwrap_err();
    assert_eq!(
        err,
        UpdateError::UnsupportedPlatform {
            os: "windows".to_string(),
            arch: "x86_64".to_string(),
        }
    );
    assert!(Platform::from_parts("linux", "riscv64").is_err());
    let mac = Platform::from_parts("macos", "aarch64").unwrap();
    assert_eq!(mac.asset_name(), "toolhub-darwin-arm64");
}
