//! Time sources for the scheduler.
//!
//! Due-time arithmetic runs on a monotonic instant while window admission
//! runs on wall-clock time of day. Both come from a [`Clock`] so tests can
//! substitute a controlled source.

use std::sync::Mutex;

use chrono::{Local, NaiveTime};
use tokio::time::Instant;

/// A time source for the scheduler.
///
/// The monotonic side drives due-time computation; the time-of-day side
/// drives [`TimeWindow`](crate::TimeWindow) admission.
pub trait Clock: Send + Sync {
    /// Returns the current monotonic instant.
    fn now(&self) -> Instant;

    /// Returns the current wall-clock time of day.
    fn time_of_day(&self) -> NaiveTime;
}

/// The default clock: runtime monotonic time plus the local wall clock.
///
/// `now` is a [`tokio::time::Instant`], so tests running under tokio's
/// paused clock observe virtual time here as well.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn time_of_day(&self) -> NaiveTime {
        Local::now().time()
    }
}

/// A clock with a manually controlled time of day, for testing window
/// admission.
///
/// The monotonic side still follows the runtime clock (pause tokio time in
/// tests for full determinism); only `time_of_day` is pinned, via
/// [`ManualClock::set_time_of_day`].
#[derive(Debug)]
pub struct ManualClock {
    time_of_day: Mutex<NaiveTime>,
}

impl ManualClock {
    /// Creates a clock pinned at the given time of day.
    pub fn new(time_of_day: NaiveTime) -> Self {
        Self {
            time_of_day: Mutex::new(time_of_day),
        }
    }

    /// Moves the pinned time of day.
    pub fn set_time_of_day(&self, time_of_day: NaiveTime) {
        *self.time_of_day.lock().unwrap() = time_of_day;
    }

    /// Advances the pinned time of day, wrapping across midnight.
    pub fn advance_time_of_day(&self, delta: chrono::Duration) {
        let mut tod = self.time_of_day.lock().unwrap();
        // NaiveTime addition wraps at 24h, which is exactly what a
        // date-less time of day needs.
        *tod = tod.overflowing_add_signed(delta).0;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn time_of_day(&self) -> NaiveTime {
        *self.time_of_day.lock().unwrap()
    }
}
