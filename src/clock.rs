//! Wall-clock abstraction so time-dependent rules can be driven in tests.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current unix time in seconds
    fn unix(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Real system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock with one-second resolution.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<i64>,
}

impl ManualClock {
    pub fn new(unix_secs: i64) -> Self {
        Self {
            current: Mutex::new(unix_secs),
        }
    }

    pub fn set(&self, unix_secs: i64) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = unix_secs;
    }

    pub fn advance(&self, secs: i64) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) += secs;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let secs = *self.current.lock().unwrap_or_else(|e| e.into_inner());
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }
}
