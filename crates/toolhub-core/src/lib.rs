// crates/toolhub-core/src/lib.rs
// ============================================================================
// Module: Toolhub Core
// Description: Tool catalog, enablement, telemetry, and invocation wrapping.
// Purpose: Provide the transport-agnostic dispatch core for Toolhub.
// Dependencies: toolhub-config, tokio, serde
// ============================================================================

//! ## Overview
//! Toolhub Core owns everything between a protocol request and a tool handler:
//! the immutable [`Catalog`] of tools and groups, the pure enablement
//! resolver, the [`TelemetryBus`] that records and fans out invocation
//! events, and the [`Invoker`] that wraps every handler call.
//!
//! Transports live elsewhere; this crate never touches sockets or stdio.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod catalog;
pub mod dispatch;
pub mod enablement;
pub mod invocation;
pub mod telemetry;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use catalog::Catalog;
pub use catalog::CatalogError;
pub use catalog::GroupDescriptor;
pub use catalog::ToolDescriptor;
pub use dispatch::DispatchError;
pub use dispatch::Dispatcher;
pub use enablement::Enablement;
pub use enablement::EnablementReason;
pub use enablement::ToolStatus;
pub use enablement::is_enabled;
pub use enablement::missing_requirements;
pub use enablement::resolve;
pub use enablement::tool_statuses;
pub use invocation::InvocationContext;
pub use invocation::Invoker;
pub use invocation::ToolContent;
pub use invocation::ToolError;
pub use invocation::ToolHandler;
pub use invocation::ToolOutput;
pub use telemetry::Event;
pub use telemetry::EventKind;
pub use telemetry::LiveStream;
pub use telemetry::NewEvent;
pub use telemetry::Session;
pub use telemetry::StatsSnapshot;
pub use telemetry::Subscription;
pub use telemetry::TelemetryBus;
pub use telemetry::TelemetryLimits;
pub use telemetry::TimeseriesBucket;
pub use telemetry::TimeseriesPoint;
pub use telemetry::ToolStats;
pub use telemetry::Totals;
