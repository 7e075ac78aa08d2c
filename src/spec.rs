//! Task specifications.
//!
//! A [`TaskSpec`] is the immutable configuration of a periodic task:
//! interval, priority, admission windows, start behavior and running-time
//! limit. Specs are built through [`TaskSpecBuilder`], which validates on
//! [`build`](TaskSpecBuilder::build).

use std::fmt;
use std::time::Duration;

use uuid::Uuid;

use crate::errors::MetronomeError;
use crate::window::TimeWindow;
use crate::Result;

/// Dispatch priority of a task.
///
/// When several tasks are due on the same tick, higher priorities are
/// dispatched first.
///
/// # Examples
///
/// ```
/// use metronome::Priority;
///
/// assert!(Priority::Critical > Priority::High);
/// assert!(Priority::High > Priority::Normal);
/// assert!(Priority::Normal > Priority::Low);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Dispatched after everything else.
    Low,
    /// The default priority.
    Normal,
    /// Dispatched before normal traffic.
    High,
    /// Dispatched first.
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// Immutable configuration of a periodic task.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use metronome::{Priority, TaskSpec};
///
/// let spec = TaskSpec::every_secs(30)
///     .with_name("heartbeat")
///     .with_priority(Priority::High)
///     .with_max_running_time(Duration::from_secs(5))
///     .build()
///     .unwrap();
///
/// assert_eq!(spec.name(), "heartbeat");
/// assert_eq!(spec.interval(), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct TaskSpec {
    name: String,
    interval: Duration,
    priority: Priority,
    time_windows: Vec<TimeWindow>,
    start_immediately: bool,
    max_running_time: Option<Duration>,
}

impl TaskSpec {
    /// Starts a builder for a task running every `interval`.
    pub fn every(interval: Duration) -> TaskSpecBuilder {
        TaskSpecBuilder::new(Some(interval))
    }

    /// Starts a builder for a task running every `secs` whole seconds.
    pub fn every_secs(secs: u64) -> TaskSpecBuilder {
        TaskSpecBuilder::new(Some(Duration::from_secs(secs)))
    }

    /// Starts a builder for a task running every `secs` fractional seconds.
    ///
    /// Negative, zero, NaN or infinite inputs are rejected when
    /// [`build`](TaskSpecBuilder::build) runs.
    pub fn every_secs_f64(secs: f64) -> TaskSpecBuilder {
        TaskSpecBuilder::new(Duration::try_from_secs_f64(secs).ok())
    }

    /// Returns the task's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the scheduling interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the dispatch priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns the admission windows. Empty means always admitted.
    pub fn time_windows(&self) -> &[TimeWindow] {
        &self.time_windows
    }

    /// Returns whether the first run is due immediately on registration.
    pub fn start_immediately(&self) -> bool {
        self.start_immediately
    }

    /// Returns the per-run execution time limit, if any.
    pub fn max_running_time(&self) -> Option<Duration> {
        self.max_running_time
    }
}

/// Builder for [`TaskSpec`].
///
/// Created through [`TaskSpec::every`] and friends; validation happens in
/// [`build`](TaskSpecBuilder::build).
#[derive(Debug, Clone)]
pub struct TaskSpecBuilder {
    name: Option<String>,
    interval: Option<Duration>,
    priority: Priority,
    time_windows: Vec<TimeWindow>,
    start_immediately: bool,
    max_running_time: Option<Duration>,
}

impl TaskSpecBuilder {
    fn new(interval: Option<Duration>) -> Self {
        Self {
            name: None,
            interval,
            priority: Priority::Normal,
            time_windows: Vec::new(),
            start_immediately: true,
            max_running_time: None,
        }
    }

    /// Sets the task name. Names must be unique within a scheduler; when
    /// omitted a `task-<hex>` name is generated.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the dispatch priority (default [`Priority::Normal`]).
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Adds an admission window. May be called repeatedly; a task with no
    /// windows is always admitted.
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.time_windows.push(window);
        self
    }

    /// Sets whether the first run is due immediately (default) or one
    /// interval after registration.
    pub fn with_start_immediately(mut self, start_immediately: bool) -> Self {
        self.start_immediately = start_immediately;
        self
    }

    /// Sets the per-run execution time limit.
    pub fn with_max_running_time(mut self, limit: Duration) -> Self {
        self.max_running_time = Some(limit);
        self
    }

    /// Validates and produces the spec.
    ///
    /// # Errors
    ///
    /// Returns [`MetronomeError::InvalidSpec`] if the interval is missing
    /// or zero, the running-time limit is zero, or an explicit name is
    /// empty.
    pub fn build(self) -> Result<TaskSpec> {
        let interval = match self.interval {
            Some(d) if !d.is_zero() => d,
            _ => {
                return Err(MetronomeError::InvalidSpec(
                    "interval must be positive".to_string(),
                ))
            }
        };

        if matches!(self.max_running_time, Some(d) if d.is_zero()) {
            return Err(MetronomeError::InvalidSpec(
                "max_running_time must be positive".to_string(),
            ));
        }

        let name = match self.name {
            Some(name) => {
                if name.trim().is_empty() {
                    return Err(MetronomeError::InvalidSpec(
                        "name must not be empty".to_string(),
                    ));
                }
                name
            }
            None => {
                let id = Uuid::new_v4().to_string();
                format!("task-{}", &id[..8])
            }
        };

        Ok(TaskSpec {
            name,
            interval,
            priority: self.priority,
            time_windows: self.time_windows,
            start_immediately: self.start_immediately,
            max_running_time: self.max_running_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn test_build_minimal() {
        let spec = TaskSpec::every_secs(10).build().unwrap();

        assert!(spec.name().starts_with("task-"));
        assert_eq!(spec.interval(), Duration::from_secs(10));
        assert_eq!(spec.priority(), Priority::Normal);
        assert!(spec.time_windows().is_empty());
        assert!(spec.start_immediately());
        assert!(spec.max_running_time().is_none());
    }

    #[test]
    fn test_build_full() {
        let window = TimeWindow::new(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        );

        let spec = TaskSpec::every(Duration::from_millis(250))
            .with_name("reindex")
            .with_priority(Priority::Critical)
            .with_window(window)
            .with_start_immediately(false)
            .with_max_running_time(Duration::from_secs(1))
            .build()
            .unwrap();

        assert_eq!(spec.name(), "reindex");
        assert_eq!(spec.interval(), Duration::from_millis(250));
        assert_eq!(spec.priority(), Priority::Critical);
        assert_eq!(spec.time_windows(), &[window]);
        assert!(!spec.start_immediately());
        assert_eq!(spec.max_running_time(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_fractional_interval() {
        let spec = TaskSpec::every_secs_f64(0.5).build().unwrap();
        assert_eq!(spec.interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_rejects_zero_interval() {
        assert!(TaskSpec::every(Duration::ZERO).build().is_err());
        assert!(TaskSpec::every_secs(0).build().is_err());
        assert!(TaskSpec::every_secs_f64(0.0).build().is_err());
    }

    #[test]
    fn test_rejects_invalid_fractional_interval() {
        assert!(TaskSpec::every_secs_f64(-1.0).build().is_err());
        assert!(TaskSpec::every_secs_f64(f64::NAN).build().is_err());
        assert!(TaskSpec::every_secs_f64(f64::INFINITY).build().is_err());
    }

    #[test]
    fn test_rejects_empty_name() {
        let result = TaskSpec::every_secs(1).with_name("").build();
        assert!(matches!(result, Err(MetronomeError::InvalidSpec(_))));

        let result = TaskSpec::every_secs(1).with_name("   ").build();
        assert!(matches!(result, Err(MetronomeError::InvalidSpec(_))));
    }

    #[test]
    fn test_rejects_zero_max_running_time() {
        let result = TaskSpec::every_secs(1)
            .with_max_running_time(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(MetronomeError::InvalidSpec(_))));
    }

    #[test]
    fn test_generated_names_are_distinct() {
        let a = TaskSpec::every_secs(1).build().unwrap();
        let b = TaskSpec::every_secs(1).build().unwrap();
        assert_ne!(a.name(), b.name());
    }

    #[test]
    fn test_priority_order() {
        let mut priorities = vec![
            Priority::High,
            Priority::Low,
            Priority::Critical,
            Priority::Normal,
        ];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![
                Priority::Low,
                Priority::Normal,
                Priority::High,
                Priority::Critical
            ]
        );
    }

    #[test]
    fn test_priority_display() {
        assert_eq!(Priority::Low.to_string(), "low");
        assert_eq!(Priority::Critical.to_string(), "critical");
    }
}
