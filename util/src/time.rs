//! General time utility functions

use chrono;

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a duration into a number of seconds, or `None` if the nanosecond count overflows.
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

/// Convert a number of seconds into a duration, truncated to the nearest nanosecond.
pub fn seconds_to_duration(seconds: f64) -> chrono::Duration {
    chrono::Duration::nanoseconds((seconds * NANOS_PER_SECOND as f64) as i64)
}
