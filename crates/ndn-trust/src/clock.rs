//! Millisecond clock helpers.
//!
//! All validity and freshness arithmetic in this crate runs on `u64`
//! milliseconds since the Unix epoch. Components that need a shiftable
//! clock for tests keep a signed offset and add it through
//! [`shifted_now_millis`].

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, saturating at zero for clocks set
/// before it.
pub(crate) fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

pub(crate) fn now_millis() -> u64 {
    unix_millis(SystemTime::now())
}

/// The current time shifted by a test offset.
pub(crate) fn shifted_now_millis(offset_ms: i64) -> u64 {
    now_millis().saturating_add_signed(offset_ms)
}
