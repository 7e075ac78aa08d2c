//! Time-of-day admission windows.
//!
//! A [`TimeWindow`] restricts when a task may be dispatched, independent of
//! its interval. Windows are pure wall-clock predicates; a window whose end
//! lies before its start wraps across midnight.

use chrono::{Days, NaiveDateTime, NaiveTime};

/// An inclusive time-of-day range during which a task may run.
///
/// # Examples
///
/// ```
/// use chrono::NaiveTime;
/// use metronome::TimeWindow;
///
/// let business_hours = TimeWindow::new(
///     NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
///     NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
/// );
/// assert!(business_hours.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
/// assert!(!business_hours.contains(NaiveTime::from_hms_opt(18, 0, 0).unwrap()));
///
/// // Wraps across midnight:
/// let night = TimeWindow::new(
///     NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
///     NaiveTime::from_hms_opt(1, 0, 0).unwrap(),
/// );
/// assert!(night.contains(NaiveTime::from_hms_opt(23, 59, 59).unwrap()));
/// assert!(night.contains(NaiveTime::from_hms_opt(0, 0, 1).unwrap()));
/// assert!(!night.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl TimeWindow {
    /// Creates a window admitting times in `[start, end]` inclusive.
    ///
    /// `start == end` is allowed and admits only that exact instant.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Returns the window's opening time of day.
    pub fn start(&self) -> NaiveTime {
        self.start
    }

    /// Returns the window's closing time of day.
    pub fn end(&self) -> NaiveTime {
        self.end
    }

    /// Returns true if the given time of day falls inside the window.
    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= now && now <= self.end
        } else {
            // Wraps midnight: [start, 24:00) ∪ [00:00, end]
            now >= self.start || now <= self.end
        }
    }

    /// Returns the earliest instant at or after `now` at which the window
    /// admits.
    ///
    /// Useful for embedders planning work around closed windows; the
    /// scheduler itself only re-tests admission each tick.
    pub fn next_open_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        if self.contains(now.time()) {
            return now;
        }
        let start_today = now.date().and_time(self.start);
        if now.time() < self.start {
            start_today
        } else {
            start_today
                .checked_add_days(Days::new(1))
                .expect("date overflow")
        }
    }
}

/// Returns true if `windows` is empty or any window admits `now`.
pub fn admits_any(windows: &[TimeWindow], now: NaiveTime) -> bool {
    windows.is_empty() || windows.iter().any(|w| w.contains(now))
}
