//! # Metronome: Periodic Task Scheduling for Rust
//!
//! Metronome is an in-process periodic task scheduler built on Tokio. It
//! runs user-supplied async callables at configurable intervals, dispatches
//! them in priority order, confines them to time-of-day windows, enforces
//! per-run time limits and exposes a full task lifecycle with observable
//! state transitions.
//!
//! ## Features
//!
//! - **Interval Scheduling**: Sub-second to multi-hour intervals, with the
//!   next run anchored to the previous run's finish so slow runs never
//!   accumulate a backlog
//! - **Priorities**: Four levels; when several tasks are due on the same
//!   tick the most important one is dispatched first
//! - **Time Windows**: Restrict tasks to wall-clock windows, including
//!   windows wrapping midnight
//! - **Running-Time Limits**: Per-task `max_running_time` with cooperative
//!   cancellation; an overrunning body is counted as failed and detached,
//!   never forcibly killed
//! - **Lifecycle Control**: Pause/resume, stop/reset and cancel per task,
//!   with every status transition delivered to callbacks
//! - **Callbacks**: Per-task status-change, success and failure callbacks;
//!   a panicking callback is isolated and counted, never disturbing the
//!   scheduler or sibling callbacks
//! - **Foreground or Background**: Run the dispatch loop on a worker or
//!   block the caller until shutdown
//! - **Injectable Clock**: Swap the time source in tests
//! - **Thread-Safe**: All components are safe to share across threads
//!
//! ## Quick Start
//!
//! Add Metronome to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! metronome = "0.1.0"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! ## Basic Example
//!
//! ```no_run
//! use metronome::{Scheduler, TaskSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scheduler = Scheduler::new();
//!
//!     // Run every five minutes, starting now.
//!     scheduler.register(
//!         TaskSpec::every_secs(300).with_name("refresh-cache").build()?,
//!         |_ctx| async {
//!             println!("refreshing!");
//!             Ok(())
//!         },
//!     )?;
//!
//!     scheduler.start().await?;
//!
//!     // Let it run for a while
//!     tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
//!
//!     // Stop the scheduler gracefully
//!     scheduler.stop().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Advanced Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use chrono::NaiveTime;
//! use metronome::{
//!     Mode, Priority, Scheduler, SchedulerConfig, SystemClock, TaskSpec, TimeWindow,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scheduler = Scheduler::with_config(SchedulerConfig {
//!         mode: Mode::Background,
//!         check_interval: Duration::from_millis(100),
//!         shutdown_grace: Duration::from_secs(10),
//!         clock: Arc::new(SystemClock),
//!     });
//!
//!     // A nightly compaction confined to a window that wraps midnight,
//!     // dispatched ahead of everything else that is due.
//!     let handle = scheduler.register(
//!         TaskSpec::every_secs(3600)
//!             .with_name("compact")
//!             .with_priority(Priority::Critical)
//!             .with_window(TimeWindow::new(
//!                 NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
//!                 NaiveTime::from_hms_opt(5, 0, 0).unwrap(),
//!             ))
//!             .with_max_running_time(Duration::from_secs(600))
//!             .build()?,
//!         |ctx| async move {
//!             while !ctx.is_cancelled() {
//!                 // compact the next chunk...
//!                 break;
//!             }
//!             Ok(())
//!         },
//!     )?;
//!
//!     handle.add_failure_callback(|task, failure| {
//!         eprintln!("{} failed: {}", task.name, failure);
//!     });
//!
//!     scheduler.start().await?;
//!     // ...
//!     scheduler.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`Scheduler`] - Owns the task registry and the dispatch loop
//! - [`TaskSpec`] - Immutable configuration of a periodic task
//! - [`TaskHandle`] - Lifecycle control and statistics for one task
//! - [`TimeWindow`] - Wall-clock admission window
//! - [`Clock`] - Injectable time source
//! - [`MetronomeError`] - Error types for the library
//! - [`Result`] - Convenient result type alias

// Re-export the main components
pub use crate::callbacks::{CallbackId, FailureCallback, StatusCallback, SuccessCallback};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::errors::MetronomeError;
pub use crate::scheduler::{Mode, Scheduler, SchedulerConfig};
pub use crate::spec::{Priority, TaskSpec, TaskSpecBuilder};
pub use crate::task::{FailureKind, TaskBody, TaskFailure, TaskHandle, TaskStatus, TaskView};
pub use crate::window::{admits_any, TimeWindow};

// Main modules
pub mod callbacks;
pub mod clock;
pub mod errors;
pub mod scheduler;
pub mod spec;
pub mod task;
pub mod window;
mod executor;

/// Convenient result type alias for Metronome operations.
///
/// This is equivalent to `std::result::Result<T, MetronomeError>`.
///
/// # Examples
///
/// ```
/// use metronome::Result;
///
/// fn do_something() -> Result<()> {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, MetronomeError>;

/// The version of the Metronome library.
///
/// This is extracted from the `Cargo.toml` at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
