// crates/toolhub-core/src/time.rs
// ============================================================================
// Module: Wall Clock
// Description: Millisecond timestamps for events and sessions.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Timestamps are unix milliseconds. A clock before the epoch reads as zero.

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Returns the current unix time in milliseconds.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
