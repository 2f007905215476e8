use std::time::Duration;

/// Strip a single trailing slash, keeping the root path intact
pub fn trim_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// Whole seconds a client should wait, rounded up
pub fn retry_after_secs(remaining: Duration) -> u64 {
    duration_to_millis(remaining).div_ceil(1000)
}

/// Millisecond view of a duration, saturating at `u64::MAX`
pub fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
