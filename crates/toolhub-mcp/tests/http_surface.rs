// crates/toolhub-mcp/tests/http_surface.rs
// ============================================================================
// Module: HTTP Surface Tests
// Description: MCP over HTTP and the management API on a live listener.
// ============================================================================

//! End-to-end checks of the HTTP transport and `/api` routes against a
//! loopback server.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions."
)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::TestServer;
use common::static_server;
use serde_json::Value;
use serde_json::json;
use toolhub_update::Platform;
use toolhub_update::UpdateManager;
use toolhub_update::UpdateManagerConfig;

#[tokio::test]
async fn session_lifecycle_is_visible_to_management() {
    let server = TestServer::start(true, None).await;
    let session = server.initialize("inspector").await;

    let sessions: Value =
        server.client.get(server.url("/api/sessions")).send().await.unwrap().json().await.unwrap();
    assert_eq!(sessions[0]["id"], session.as_str());
    assert_eq!(sessions[0]["client_name"], "inspector");

    let result = server.call(&session, "echo", json!({ "text": "ping" })).await;
    assert_eq!(result["content"][0]["text"], "ping");

    let stats: Value =
        server.client.get(server.url("/api/stats")).send().await.unwrap().json().await.unwrap();
    assert_eq!(stats["totals"]["invocations"], 1);
    assert_eq!(stats["tools"]["echo"]["success_count"], 1);
    assert_eq!(stats["active_sessions"], 1);

    let deleted = server
        .client
        .delete(server.url("/mcp"))
        .header("Mcp-Session-Id", &session)
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);
    assert!(server.bus.sessions().is_empty());
}

#[tokio::test]
async fn toggles_change_the_next_tool_listing() {
    let server = TestServer::start(true, None).await;
    let session = server.initialize("dashboard").await;
    assert!(!server.tool_names(&session).await.contains(&"fetch_url".to_string()));

    let toggled: Value = server
        .client
        .post(server.url("/api/tools/fetch_url/toggle"))
        .json(&json!({ "enabled": true }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(toggled["enabled"], true);
    assert!(server.tool_names(&session).await.contains(&"fetch_url".to_string()));

    let config: Value =
        server.client.get(server.url("/api/config")).send().await.unwrap().json().await.unwrap();
    assert_eq!(config["tools"]["fetch_url"], true);
}

#[tokio::test]
async fn config_put_enables_configured_groups() {
    let server = TestServer::start(true, None).await;
    let session = server.initialize("dashboard").await;

    let response = server
        .client
        .put(server.url("/api/config"))
        .json(&json!({ "webhooks": { "url": "https://hooks.example.test/in", "token": "abc" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let view: Value = response.json().await.unwrap();
    assert_eq!(view["webhooks"]["token"], toolhub_config::MASK);
    assert_eq!(
        server.store.snapshot().lookup("webhooks.token"),
        Some(&Value::String("abc".to_string()))
    );
    assert!(server.tool_names(&session).await.contains(&"webhook_post".to_string()));
}

#[tokio::test]
async fn event_feed_replays_then_follows() {
    let server = TestServer::start(true, None).await;
    let session = server.initialize("feed").await;

    let mut feed = server.client.get(server.url("/api/events")).send().await.unwrap();
    assert_eq!(feed.headers()["content-type"], "text/event-stream");

    server.call(&session, "current_time", json!({})).await;

    let mut text = String::new();
    let collected = tokio::time::timeout(Duration::from_secs(5), async {
        while !text.contains("event: result") {
            let chunk = feed.chunk().await.unwrap().unwrap();
            text.push_str(&String::from_utf8_lossy(&chunk));
        }
    })
    .await;
    assert!(collected.is_ok(), "feed so far: {text}");

    let connect = text.find("event: session-connect").unwrap();
    let call = text.find("event: call").unwrap();
    assert!(connect < call);
    assert!(text.contains("\"tool\":\"current_time\""));
}

#[tokio::test]
async fn health_is_always_served_and_api_can_be_disabled() {
    let server = TestServer::start(false, None).await;
    let health: Value =
        server.client.get(server.url("/health")).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");

    let api = server.client.get(server.url("/api/tools")).send().await.unwrap();
    assert_eq!(api.status(), 404);
}

#[tokio::test]
async fn update_check_reports_phases() {
    let release = json!({
        "tag_name": format!("v{}", env!("CARGO_PKG_VERSION")),
        "assets": [{ "name": "toolhub-linux-x64", "browser_download_url": "http://unused" }],
    });
    let base = static_server(release.to_string());
    let dir = tempfile::tempdir().unwrap();
    let mut config = UpdateManagerConfig::new(env!("CARGO_PKG_VERSION"), dir.path().join("bin"));
    config.release_url = format!("{base}/release.json");
    config.allow_http = true;
    config.platform = Some(Platform::from_parts("linux", "x86_64").unwrap());
    let updater = Arc::new(UpdateManager::new(config).unwrap());
    let server = TestServer::start(true, Some(updater)).await;

    let report: Value =
        server.client.get(server.url("/api/update")).send().await.unwrap().json().await.unwrap();
    assert_eq!(report["check"]["status"], "up_to_date");
    assert_eq!(report["phases"][0]["phase"], "checking");
    assert_eq!(report["phases"][1]["phase"], "up_to_date");

    let applied: Value =
        server.client.post(server.url("/api/update")).send().await.unwrap().json().await.unwrap();
    assert_eq!(applied["outcome"]["status"], "up_to_date");
}
