//! Abstractions for time to enable testing.
//!
//! The tracker counts events per *local* calendar day, so the clock hands out
//! naive local wall-clock values. Rollover and logging become deterministic
//! once a `MockClock` is injected.

use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDate, NaiveDateTime};

// ==================== Clock Trait ====================

/// Trait for abstracting time access.
///
/// This allows injecting mock clocks during testing to create
/// deterministic, reproducible tests for day rollover.
pub trait Clock: Send + Sync {
    /// Current local date-time, without timezone.
    fn now(&self) -> NaiveDateTime;

    /// Current local calendar day.
    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// System clock implementation using the host's local time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Mock clock for testing with controllable time.
///
/// Clones share the same underlying time, so a test can keep one handle and
/// move another into the tracker.
#[derive(Debug, Clone)]
pub struct MockClock {
    local_time: Arc<Mutex<NaiveDateTime>>,
}

impl MockClock {
    /// Create a new mock clock set to the given local time.
    pub fn new(time: NaiveDateTime) -> Self {
        Self {
            local_time: Arc::new(Mutex::new(time)),
        }
    }

    /// Set the mock clock to a new time.
    pub fn set_time(&self, time: NaiveDateTime) {
        *self.local_time.lock().unwrap() = time;
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: chrono::Duration) {
        let mut time = self.local_time.lock().unwrap();
        *time += duration;
    }
}

impl Clock for MockClock {
    fn now(&self) -> NaiveDateTime {
        *self.local_time.lock().unwrap()
    }
}
