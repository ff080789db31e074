// crates/toolhub-config/src/config/tests.rs
// ============================================================================
// Module: Config Model Unit Tests
// Description: Lookup, merge, and redaction behaviour of the config model.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions."
)]

use serde_json::json;

use super::Config;
use super::MASK;
use super::is_present;

fn sample() -> Config {
    Config::from_toml(
        r#"
[tools]
fetch_url = true

[server]
port = 4100

[apiKeys]
search = "sk-live-123"
empty = ""

[webhooks]
url = "https://hooks.example.test/in"
signing_token = "tok-9"
retries = 3
"#,
    )
    .unwrap()
}

#[test]
fn lookup_walks_nested_tables() {
    let config = sample();
    assert_eq!(config.lookup("apiKeys.search"), Some(&json!("sk-live-123")));
    assert_eq!(config.lookup("webhooks.retries"), Some(&json!(3)));
}

#[test]
fn lookup_missing_intermediate_is_absent() {
    let config = sample();
    assert!(config.lookup("nothing.here.at.all").is_none());
    assert!(config.lookup("apiKeys.search.deeper").is_none());
    assert!(!config.has_value("missing.key"));
}

#[test]
fn blank_values_are_not_present() {
    let config = sample();
    assert!(!config.has_value("apiKeys.empty"));
    assert!(config.has_value("apiKeys.search"));
    assert!(!is_present(&json!(false)));
    assert!(!is_present(&json!(0)));
    assert!(!is_present(&json!("   ")));
    assert!(is_present(&json!(["a"])));
}

#[test]
fn typed_sections_are_separate_from_values() {
    let config = sample();
    assert_eq!(config.server.port, Some(4100));
    assert_eq!(config.tool_override("fetch_url"), Some(true));
    assert!(!config.values.contains_key("tools"));
    assert!(!config.values.contains_key("server"));
}

#[test]
fn merge_never_overwrites_secret_with_mask() {
    let mut config = sample();
    let redacted = config.redacted();
    config.merge(&redacted).unwrap();
    assert_eq!(config.lookup("apiKeys.search"), Some(&json!("sk-live-123")));
    assert_eq!(config.lookup("webhooks.signing_token"), Some(&json!("tok-9")));
}

#[test]
fn merge_keeps_secret_arrays_when_masks_come_back() {
    let mut config = Config::from_toml(
        r#"
[apiKeys]
keys = ["sk-a", "sk-b"]

[webhooks]
tokens = ["tok-1"]
targets = [{ url = "https://a.example.test", token = "tok-a" }]
"#,
    )
    .unwrap();
    let redacted = config.redacted();
    assert_eq!(redacted["apiKeys"]["keys"], json!([MASK, MASK]));
    assert_eq!(redacted["webhooks"]["targets"][0]["token"], json!(MASK));

    config.merge(&redacted).unwrap();
    assert_eq!(config.lookup("apiKeys.keys"), Some(&json!(["sk-a", "sk-b"])));
    assert_eq!(config.lookup("webhooks.tokens"), Some(&json!(["tok-1"])));
    assert_eq!(
        config.lookup("webhooks.targets"),
        Some(&json!([{ "url": "https://a.example.test", "token": "tok-a" }]))
    );

    config.merge(&json!({ "apiKeys": { "keys": [MASK, "sk-c"] } })).unwrap();
    assert_eq!(config.lookup("apiKeys.keys"), Some(&json!(["sk-a", "sk-c"])));
    config.merge(&json!({ "apiKeys": { "keys": ["sk-d"] } })).unwrap();
    assert_eq!(config.lookup("apiKeys.keys"), Some(&json!(["sk-d"])));
    config.merge(&json!({ "fresh": { "tokens": [MASK] } })).unwrap();
    assert!(config.lookup("fresh.tokens").is_none());
}

#[test]
fn merge_replaces_deletes_and_recurses() {
    let mut config = sample();
    config
        .merge(&json!({
            "apiKeys": { "search": "sk-new", "empty": null },
            "webhooks": { "retries": 5 },
            "tools": { "fetch_url": false, "echo": true },
            "newSection": { "nested": { "flag": true } }
        }))
        .unwrap();
    assert_eq!(config.lookup("apiKeys.search"), Some(&json!("sk-new")));
    assert!(config.lookup("apiKeys.empty").is_none());
    assert_eq!(config.lookup("webhooks.url"), Some(&json!("https://hooks.example.test/in")));
    assert_eq!(config.lookup("webhooks.retries"), Some(&json!(5)));
    assert_eq!(config.tool_override("fetch_url"), Some(false));
    assert_eq!(config.tool_override("echo"), Some(true));
    assert_eq!(config.lookup("newSection.nested.flag"), Some(&json!(true)));
}

#[test]
fn merge_rejects_invalid_typed_section_and_keeps_state() {
    let mut config = sample();
    let before = config.clone();
    let result = config.merge(&json!({ "server": { "port": "not-a-port" } }));
    assert!(result.is_err());
    assert_eq!(config, before);
}

#[test]
fn merge_rejects_non_object_patch() {
    let mut config = sample();
    assert!(config.merge(&json!(["nope"])).is_err());
}

#[test]
fn redaction_masks_secrets_only() {
    let config = sample();
    let redacted = config.redacted();
    assert_eq!(redacted["apiKeys"]["search"], json!(MASK));
    assert_eq!(redacted["apiKeys"]["empty"], json!(""));
    assert_eq!(redacted["webhooks"]["signing_token"], json!(MASK));
    assert_eq!(redacted["webhooks"]["url"], json!("https://hooks.example.test/in"));
    assert_eq!(redacted["server"]["port"], json!(4100));
}

#[test]
fn redaction_covers_tables_named_as_secrets() {
    let config = Config::from_toml(
        r#"
[tokens]
github = "ghp-1"

[secrets.db]
user = "app"
port = 5432

[webhooks]
url = "https://hooks.example.test/in"
"#,
    )
    .unwrap();
    let redacted = config.redacted();
    assert_eq!(redacted["tokens"]["github"], json!(MASK));
    assert_eq!(redacted["secrets"]["db"]["user"], json!(MASK));
    assert_eq!(redacted["secrets"]["db"]["port"], json!(5432));
    assert_eq!(redacted["webhooks"]["url"], json!("https://hooks.example.test/in"));
}

#[test]
fn set_and_unset_path_round_trip() {
    let mut config = Config::default();
    config.set_path("apiKeys.x", json!("secret")).unwrap();
    assert!(config.has_value("apiKeys.x"));
    let removed = config.unset_path("apiKeys.x").unwrap();
    assert_eq!(removed, Some(json!("secret")));
    assert!(!config.has_value("apiKeys.x"));
}

#[test]
fn set_path_rejects_reserved_and_empty_segments() {
    let mut config = Config::default();
    assert!(config.set_path("tools.echo", json!(true)).is_err());
    assert!(config.set_path("apiKeys..x", json!("v")).is_err());
    assert!(config.set_path("", json!("v")).is_err());
}

#[test]
fn set_path_rejects_scalar_intermediate() {
    let mut config = Config::default();
    config.set_path("webhooks", json!("flat")).unwrap();
    assert!(config.set_path("webhooks.url", json!("https://x.test")).is_err());
}

#[test]
fn toml_round_trip_preserves_values() {
    let config = sample();
    let rendered = config.to_toml().unwrap();
    let parsed = Config::from_toml(&rendered).unwrap();
    assert_eq!(parsed, config);
}
