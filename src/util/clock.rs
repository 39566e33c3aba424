//! Clock helpers.
//!
//! Wall-clock milliseconds are used for event timestamps. Appointment
//! expirations use [`monotonic_nanos`], an offset from a process-wide
//! anchor captured on first use, so they are unaffected by wall-clock jumps.

use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

static ANCHOR: OnceLock<Instant> = OnceLock::new();

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Nanoseconds elapsed since the process-wide monotonic anchor.
#[must_use]
pub fn monotonic_nanos() -> u64 {
    let anchor = ANCHOR.get_or_init(Instant::now);
    duration_to_nanos(anchor.elapsed())
}

/// Saturating conversion of a duration to whole nanoseconds.
#[must_use]
pub fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
