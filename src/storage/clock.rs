//! Timestamp source for appended samples

use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};

use super::codec::timestamp_nanos;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug)]
pub struct MockClock {
    now: RwLock<DateTime<Utc>>,
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl MockClock {
    pub fn with_time(time: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(time),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += duration;
    }
}

/// Hands out strictly increasing nanosecond timestamps.
///
/// Two calls in the same clock tick (or a clock that steps backwards) still
/// get distinct, ordered values: the next stamp is `max(now, last + 1)`.
/// Physical sample keys are derived from these stamps, so this is what keeps
/// fast successive appends from overwriting each other.
pub struct MonotonicStamp {
    clock: Box<dyn Clock>,
    last: AtomicI64,
}

impl MonotonicStamp {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Self {
            clock,
            last: AtomicI64::new(i64::MIN),
        }
    }

    pub fn system() -> Self {
        Self::new(Box::new(SystemClock))
    }

    pub fn next(&self) -> i64 {
        let now = timestamp_nanos(&self.clock.now());
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

impl Default for MonotonicStamp {
    fn default() -> Self {
        Self::system()
    }
}
