use std::time::Duration;

use crate::errinput;
use crate::error::Result;

/// Configuration for the segment ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingConfig {
    /// Width of one ring slot; also the GC ticker period (default: 15s).
    pub segment_duration: Duration,

    /// How long written data stays readable (default: 60s). Eviction
    /// granularity is one segment, so expiry is approximate by up to
    /// `segment_duration`.
    pub ttl: Duration,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            segment_duration: Duration::from_secs(15),
            ttl: Duration::from_secs(60),
        }
    }
}

impl RingConfig {
    pub fn new(segment_duration: Duration, ttl: Duration) -> Self {
        Self {
            segment_duration,
            ttl,
        }
    }

    /// Set the segment duration
    pub fn segment_duration(mut self, duration: Duration) -> Self {
        self.segment_duration = duration;
        self
    }

    /// Set the TTL
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The clock-to-segment mapping works in whole seconds, so both
    /// durations must be nonzero multiples of one second.
    pub fn validate(&self) -> Result<()> {
        for (name, duration) in [
            ("segment_duration", self.segment_duration),
            ("ttl", self.ttl),
        ] {
            if duration.is_zero() {
                return errinput!("{name} must be nonzero");
            }
            if duration.subsec_nanos() != 0 {
                return errinput!("{name} must be a whole number of seconds, got {duration:?}");
            }
        }
        Ok(())
    }
}
