// crates/toolhub-update/tests/common/mod.rs
// ============================================================================
// Module: Update Test Fixtures
// Description: Local release server and manager builders.
// ============================================================================

#![allow(dead_code, reason = "Shared helpers are not used by every test crate.")]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;
use toolhub_update::Platform;
use toolhub_update::UpdateManager;
use toolhub_update::UpdateManagerConfig;
use toolhub_update::UpdatePhase;

/// Canned response for one path.
#[derive(Clone)]
pub struct Route {
    /// HTTP status.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
    /// Delay before responding.
    pub delay: Duration,
}

impl Route {
    /// 200 response with `body`.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    /// Empty response with `status`.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    /// Delays the response.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Release server answering from a mutable route table.
pub struct ReleaseServer {
    /// Base URL, e.g. `http://127.0.0.1:1234`.
    pub base: String,
    /// Responses keyed by request path.
    routes: Arc<Mutex<BTreeMap<String, Route>>>,
}

impl ReleaseServer {
    /// Binds a loopback server on an ephemeral port.
    pub fn start() -> Self {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let routes: Arc<Mutex<BTreeMap<String, Route>>> = Arc::new(Mutex::new(BTreeMap::new()));
        let table = Arc::clone(&routes);
        thread::spawn(move || {
            for request in server.incoming_requests() {
                let route = table.lock().unwrap().get(request.url()).cloned();
                let Some(route) = route else {
                    let _ = request.respond(Response::empty(404));
                    continue;
                };
                thread::spawn(move || {
                    thread::sleep(route.delay);
                    let header =
                        Header::from_bytes(&b"Content-Type"[..], &b"application/octet-stream"[..])
                            .unwrap();
                    let response = Response::from_data(route.body)
                        .with_status_code(route.status)
                        .with_header(header);
                    let _ = request.respond(response);
                });
            }
        });
        Self {
            base: format!("http://{addr}"),
            routes,
        }
    }

    /// Sets the response for `path`.
    pub fn route(&self, path: &str, route: Route) {
        self.routes.lock().unwrap().insert(path.to_string(), route);
    }

    /// Returns the absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Publishes `/release.json` for `tag` with the linux-x64 binary and an
    /// optional checksum manifest.
    pub fn publish(&self, tag: &str, binary: &[u8], manifest: Option<String>) {
        let mut assets = vec![serde_json::json!({
            "name": "toolhub-linux-x64",
            "browser_download_url": self.url("/download/toolhub-linux-x64"),
        })];
        if let Some(manifest) = manifest {
            assets.push(serde_json::json!({
                "name": "checksums.txt",
                "browser_download_url": self.url("/download/checksums.txt"),
            }));
            self.route("/download/checksums.txt", Route::ok(manifest));
        }
        let release = serde_json::json!({ "tag_name": tag, "assets": assets });
        self.route("/release.json", Route::ok(release.to_string()));
        self.route("/download/toolhub-linux-x64", Route::ok(binary.to_vec()));
    }
}

/// Builds a manager pointed at `server`.
pub fn manager(server: &ReleaseServer, current: &str, install: &Path) -> UpdateManager {
    UpdateManager::new(config(server, current, install)).unwrap()
}

/// Builds manager settings pointed at `server`.
pub fn config(server: &ReleaseServer, current: &str, install: &Path) -> UpdateManagerConfig {
    let mut config = UpdateManagerConfig::new(current, install);
    config.release_url = server.url("/release.json");
    config.allow_http = true;
    config.platform = Some(Platform::from_parts("linux", "x86_64").unwrap());
    config.timeout = Duration::from_secs(10);
    config
}

/// Observer recording every phase.
#[derive(Default)]
pub struct PhaseLog {
    /// Recorded phases with details.
    pub phases: Mutex<Vec<(UpdatePhase, String)>>,
}

impl toolhub_update::UpdateObserver for PhaseLog {
    fn on_phase(&self, phase: UpdatePhase, detail: &str) {
        self.phases.lock().unwrap().push((phase, detail.to_string()));
    }
}

impl PhaseLog {
    /// Returns the distinct consecutive phases.
    pub fn kinds(&self) -> Vec<UpdatePhase> {
        let mut kinds: Vec<UpdatePhase> =
            self.phases.lock().unwrap().iter().map(|(phase, _)| *phase).collect();
        kinds.dedup();
        kinds
    }
}
