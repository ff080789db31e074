// crates/toolhub-update/src/version/tests.rs
// ============================================================================
// Module: Version Unit Tests
// Description: Tag parsing and ordering.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions."
)]

use super::Version;

#[test]
fn leading_v_is_ignored() {
    assert_eq!(Version::parse("v1.2.3"), Version::new(1, 2, 3));
    assert_eq!(Version::parse("1.2.3"), Version::new(1, 2, 3));
    assert_eq!(Version::parse(" V10.0.1 "), Version::new(10, 0, 1));
}

#[test]
fn missing_and_non_numeric_components_are_zero() {
    assert_eq!(Version::parse("v2"), Version::new(2, 0, 0));
    assert_eq!(Version::parse("1.x.4"), Version::new(1, 0, 4));
    assert_eq!(Version::parse("nightly"), Version::new(0, 0, 0));
    assert_eq!(Version::parse(""), Version::new(0, 0, 0));
}

#[test]
fn suffixes_are_dropped() {
    assert_eq!(Version::parse("v1.4.0-rc.1"), Version::new(1, 4, 0));
    assert_eq!(Version::parse("1.4.2+build.7"), Version::new(1, 4, 2));
}

#[test]
fn ordering_is_numeric_not_lexical() {
    assert!(Version::parse("1.10.0").is_newer_than(&Version::parse("1.9.9")));
    assert!(Version::parse("v1.3.0").is_newer_than(&Version::parse("1.2.3")));
    assert!(!Version::parse("v1.2.3").is_newer_than(&Version::parse("1.2.3")));
    assert!(!Version::parse("1.2.2").is_newer_than(&Version::parse("1.2.3")));
}

#[test]
fn display_renders_three_components() {
    assert_eq!(Version::parse("v3").to_string(), "3.0.0");
}
