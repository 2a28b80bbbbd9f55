use std::fmt::{Debug, Formatter};
use std::time::Duration;
use tokio::time::Instant;

/// A millisecond sample of a monotonic clock. The counter is 32 bits wide and wraps around
///  after about 49 days, so timestamps must only be compared through [Timestamp::millis_since]
///  which is wrap-tolerant as long as the compared samples are less than one wrap apart.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Default)]
pub struct Timestamp(pub u32);
impl Timestamp {
    pub fn from_millis(millis: u32) -> Timestamp {
        Timestamp(millis)
    }

    pub fn as_millis(&self) -> u32 {
        self.0
    }

    pub fn millis_since(&self, earlier: Timestamp) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    pub fn plus_millis(&self, millis: u32) -> Timestamp {
        Timestamp(self.0.wrapping_add(millis))
    }
}

impl Debug for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Converts a configured duration into the clock's millisecond domain, saturating at the
///  largest representable interval
pub fn duration_to_millis(duration: Duration) -> u32 {
    duration.as_millis().try_into().unwrap_or(u32::MAX)
}

/// The engine's time source. It is sampled for operations that are not driven by a tick
///  (i.e. application sends).
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Milliseconds since the clock was created. This is based on Tokio's [Instant] so that it
///  follows paused / advanced time in tests.
pub struct MonotonicClock {
    reference_time: Instant,
}
impl MonotonicClock {
    pub fn new() -> MonotonicClock {
        MonotonicClock {
            reference_time: Instant::now(),
        }
    }
}
impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        // truncation is intended: the counter wraps
        Timestamp(self.reference_time.elapsed().as_millis() as u32)
    }
}
