//! Wall-clock helpers shared by sessions and collectors.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns nanoseconds since the Unix epoch.
///
/// This is the time base of `ProfileOptions::start_timestamp_ns` and of the
/// session anchor timestamp.
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// Blocks the calling thread for `nanos` nanoseconds. No-op for `nanos <= 0`.
pub fn sleep_for_nanos(nanos: i64) {
    if nanos > 0 {
        std::thread::sleep(Duration::from_nanos(nanos as u64));
    }
}
