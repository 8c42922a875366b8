use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Current wall-clock time as nanoseconds since the Unix epoch.
pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Whether a timestamp is still inside the live window, i.e. newer than
/// `now - ttl`.
pub fn is_live(ts: u64, ttl: Duration) -> bool {
    ts > now_nanos().saturating_sub(ttl.as_nanos() as u64)
}

/// Whole seconds of a nanosecond timestamp.
pub fn ts_secs(ts: u64) -> u64 {
    ts / NANOS_PER_SEC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ts_secs() {
        assert_eq!(ts_secs(0), 0);
        assert_eq!(ts_secs(NANOS_PER_SEC - 1), 0);
        assert_eq!(ts_secs(NANOS_PER_SEC), 1);
        assert_eq!(ts_secs(90 * NANOS_PER_SEC + 17), 90);
    }

    #[test]
    fn test_is_live() {
        let ttl = Duration::from_secs(60);
        assert!(is_live(now_nanos(), ttl));
        assert!(is_live(now_nanos() + NANOS_PER_SEC, ttl));
        assert!(!is_live(now_nanos() - 2 * 60 * NANOS_PER_SEC, ttl));
        assert!(!is_live(0, ttl));
    }
}
