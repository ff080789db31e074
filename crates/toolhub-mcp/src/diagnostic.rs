// crates/toolhub-mcp/src/diagnostic.rs
// ============================================================================
// Module: Diagnostic Log
// Description: JSON-line sinks for telemetry events and server notices.
// Purpose: Persist an append-only diagnostic trail without a logging framework.
// Dependencies: serde, toolhub-core
// ============================================================================

//! ## Overview
//! A [`DiagnosticSink`] receives [`DiagnosticRecord`]s and writes them as one
//! JSON object per line. [`attach`] subscribes a sink to the telemetry bus so
//! every emitted event lands in the log; lifecycle notices (bind address,
//! transport, update outcomes) are recorded directly.
//!
//! Stdout is reserved for protocol traffic under the stdio transport, so no
//! sink here ever writes to it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;
use toolhub_core::Event;
use toolhub_core::Subscription;
use toolhub_core::TelemetryBus;
use toolhub_core::time::now_ms;

// ============================================================================
// SECTION: Records
// ============================================================================

/// One diagnostic log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticRecord {
    /// Record kind (`telemetry` or `notice`).
    pub event: &'static str,
    /// Record time (unix milliseconds).
    pub timestamp_ms: u64,
    /// Human-readable message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Structured payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl DiagnosticRecord {
    /// Free-form lifecycle notice.
    #[must_use]
    pub fn notice(message: impl Into<String>) -> Self {
        Self {
            event: "notice",
            timestamp_ms: now_ms(),
            message: Some(message.into()),
            detail: None,
        }
    }

    /// Notice carrying a structured payload.
    #[must_use]
    pub fn notice_with(message: impl Into<String>, detail: Value) -> Self {
        Self {
            detail: Some(detail),
            ..Self::notice(message)
        }
    }

    /// Telemetry event mirrored into the log.
    #[must_use]
    pub fn telemetry(event: &Event) -> Self {
        Self {
            event: "telemetry",
            timestamp_ms: event.timestamp_ms,
            message: None,
            detail: serde_json::to_value(event).ok(),
        }
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Destination for diagnostic records.
pub trait DiagnosticSink: Send + Sync {
    /// Records one entry; failures are swallowed.
    fn record(&self, record: &DiagnosticRecord);
}

/// Sink appending JSON lines to a file.
pub struct FileDiagnosticSink {
    /// Append-only handle.
    file: Mutex<File>,
}

impl FileDiagnosticSink {
    /// Opens `path` for appending, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory or file cannot be created.
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl DiagnosticSink for FileDiagnosticSink {
    fn record(&self, record: &DiagnosticRecord) {
        if let Ok(payload) = serde_json::to_string(record)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// Sink writing JSON lines to stderr.
pub struct StderrDiagnosticSink;

impl DiagnosticSink for StderrDiagnosticSink {
    fn record(&self, record: &DiagnosticRecord) {
        if let Ok(payload) = serde_json::to_string(record) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Sink discarding everything.
pub struct NoopDiagnosticSink;

impl DiagnosticSink for NoopDiagnosticSink {
    fn record(&self, _record: &DiagnosticRecord) {}
}

/// Mirrors every bus event into `sink` until the returned handle is dropped.
#[must_use = "dropping the subscription stops logging"]
pub fn attach(bus: &TelemetryBus, sink: Arc<dyn DiagnosticSink>) -> Subscription {
    bus.subscribe(move |event: &Event| sink.record(&DiagnosticRecord::telemetry(event)))
}
