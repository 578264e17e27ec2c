//! Utility functions for Concord
//!
//! Timing helpers used by the engine's log lines and timestamp conversions
//! used by UI-facing views.

use std::time::Instant;

use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use crate::types::Timestamp;

/// Log the start of an operation and return the start time
pub fn log_operation_start(operation: &str) -> Instant {
    debug!("🔧 Starting operation: {}", operation);
    Instant::now()
}

/// Log the end of an operation with duration
pub fn log_operation_end(operation: &str, start: Instant) {
    debug!("✅ Completed {} in {:?}", operation, start.elapsed());
}

/// Convert an `origin_server_ts` to a UTC datetime.
///
/// Returns `None` for values outside chrono's representable range.
pub fn timestamp_to_datetime(ts: Timestamp) -> Option<DateTime<Utc>> {
    let millis = i64::try_from(ts).ok()?;
    Utc.timestamp_millis_opt(millis).single()
}
