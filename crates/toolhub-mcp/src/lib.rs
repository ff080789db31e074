// crates/toolhub-mcp/src/lib.rs
// ============================================================================
// Module: Toolhub MCP
// Description: MCP server, built-in tools, and management surface.
// Purpose: Expose the Toolhub dispatcher to MCP clients and operators.
// Dependencies: axum, reqwest, tokio, toolhub-core, toolhub-update
// ============================================================================

//! ## Overview
//! Toolhub MCP wires the dispatch core to the outside world. [`rpc`] maps
//! JSON-RPC methods onto the dispatcher, [`server`] frames them over stdio or
//! HTTP, [`tools`] supplies the built-in catalog and handlers, [`management`]
//! serves the REST and SSE API, and [`diagnostic`] mirrors telemetry into a
//! JSON-lines log.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod diagnostic;
pub mod management;
pub mod rpc;
pub mod server;
pub mod tools;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use diagnostic::DiagnosticRecord;
pub use diagnostic::DiagnosticSink;
pub use diagnostic::FileDiagnosticSink;
pub use diagnostic::NoopDiagnosticSink;
pub use diagnostic::StderrDiagnosticSink;
pub use rpc::JsonRpcRequest;
pub use rpc::JsonRpcResponse;
pub use rpc::RpcHandler;
pub use server::AppState;
pub use server::McpServer;
pub use server::McpServerError;
pub use server::ServerOptions;
pub use server::Transport;
pub use server::router;
pub use server::serve_http;
pub use server::serve_stdio;
pub use tools::BuiltinContext;
pub use tools::PhaseTranscript;
pub use tools::builtin_catalog;
pub use tools::builtin_dispatcher;
