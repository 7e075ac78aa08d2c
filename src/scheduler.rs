//! The scheduler and its dispatch loop.
//!
//! [`Scheduler`] owns the task registry and runs the periodic dispatch
//! loop: each tick it snapshots the registered tasks, selects those that
//! are due and admitted by their time windows, orders them by priority and
//! hands each to the executor on its own worker.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use log::{debug, info, trace, warn};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::errors::MetronomeError;
use crate::executor;
use crate::spec::{Priority, TaskSpec};
use crate::task::{Task, TaskBody, TaskHandle};
use crate::Result;

/// How the scheduler occupies the caller of [`Scheduler::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `start` blocks until the scheduler is stopped or interrupted.
    Foreground,
    /// `start` spawns the dispatch loop and returns immediately.
    Background,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Background
    }
}

/// Configuration options for the scheduler
#[derive(Clone)]
pub struct SchedulerConfig {
    /// Foreground or background operation (default background). May be
    /// changed with [`Scheduler::set_mode`] until the scheduler starts.
    pub mode: Mode,
    /// How frequently the dispatch loop checks for due tasks. Must be
    /// positive.
    pub check_interval: Duration,
    /// How long [`Scheduler::stop`] waits for in-flight runs to finish.
    pub shutdown_grace: Duration,
    /// Time source; substitute a [`ManualClock`](crate::ManualClock) in
    /// tests.
    pub clock: Arc<dyn Clock>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            mode: Mode::Background,
            check_interval: Duration::from_millis(100),
            shutdown_grace: Duration::from_secs(5),
            clock: Arc::new(SystemClock),
        }
    }
}

impl fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("mode", &self.mode)
            .field("check_interval", &self.check_interval)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish()
    }
}

struct SchedulerInner {
    tasks: RwLock<HashMap<String, Arc<Task>>>,
    config: SchedulerConfig,
    mode: Mutex<Mode>,
    started: AtomicBool,
    stopped: AtomicBool,
    shutdown: CancellationToken,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    next_seq: AtomicU64,
}

/// The scheduler: task registry plus dispatch loop.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use metronome::{Scheduler, TaskSpec};
///
/// #[tokio::main]
/// async fn main() -> metronome::Result<()> {
///     let scheduler = Scheduler::new();
///
///     scheduler.register(
///         TaskSpec::every_secs(60).with_name("heartbeat").build()?,
///         |_ctx| async {
///             println!("still alive");
///             Ok(())
///         },
///     )?;
///
///     scheduler.start().await?;
///     tokio::time::sleep(Duration::from_secs(300)).await;
///     scheduler.stop().await?;
///     Ok(())
/// }
/// ```
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Creates a scheduler with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Creates a scheduler with the given configuration.
    pub fn with_config(config: SchedulerConfig) -> Self {
        let mode = config.mode;
        Scheduler {
            inner: Arc::new(SchedulerInner {
                tasks: RwLock::new(HashMap::new()),
                mode: Mutex::new(mode),
                config,
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                loop_handle: Mutex::new(None),
                next_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Registers a task. Allowed both before and after [`start`](Scheduler::start).
    ///
    /// The body receives a cancellation token it should poll so that
    /// timeouts, `stop` and scheduler shutdown can interrupt it
    /// cooperatively.
    ///
    /// # Errors
    ///
    /// Returns [`MetronomeError::DuplicateName`] if a task with the same
    /// name is already registered.
    pub fn register<F, Fut>(&self, spec: TaskSpec, body: F) -> Result<TaskHandle>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let body: TaskBody = Arc::new(move |token| Box::pin(body(token)));
        let clock = Arc::clone(&self.inner.config.clock);

        let mut tasks = self.inner.tasks.write().unwrap();
        if tasks.contains_key(spec.name()) {
            return Err(MetronomeError::DuplicateName(spec.name().to_string()));
        }

        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let name = spec.name().to_string();
        let task = Arc::new(Task::new(spec, body, seq, clock.now()));
        tasks.insert(name.clone(), Arc::clone(&task));

        debug!("Registered task '{}'", name);
        Ok(TaskHandle::new(task, clock))
    }

    /// Removes a task from the scheduler.
    ///
    /// A task with a run in flight is cancelled and its registry entry is
    /// removed once that run returns; existing [`TaskHandle`]s stay usable
    /// either way.
    ///
    /// # Errors
    ///
    /// Returns [`MetronomeError::NotFound`] if no task has that name.
    pub fn remove(&self, name: &str) -> Result<()> {
        let task = {
            let tasks = self.inner.tasks.read().unwrap();
            tasks.get(name).cloned()
        }
        .ok_or_else(|| MetronomeError::NotFound(name.to_string()))?;

        if task.is_in_flight() {
            let _ = task.cancel();
            let inner = Arc::clone(&self.inner);
            let name = name.to_string();
            tokio::spawn(async move {
                task.wait_idle().await;
                inner.tasks.write().unwrap().remove(&name);
                debug!("Removed task '{}' after its run returned", name);
            });
        } else {
            self.inner.tasks.write().unwrap().remove(name);
            debug!("Removed task '{}'", name);
        }
        Ok(())
    }

    /// Returns a handle to a registered task.
    pub fn get_task(&self, name: &str) -> Option<TaskHandle> {
        let tasks = self.inner.tasks.read().unwrap();
        tasks
            .get(name)
            .map(|task| TaskHandle::new(Arc::clone(task), Arc::clone(&self.inner.config.clock)))
    }

    /// Returns the names of all registered tasks, sorted.
    pub fn task_names(&self) -> Vec<String> {
        let tasks = self.inner.tasks.read().unwrap();
        let mut names: Vec<String> = tasks.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Returns the scheduler's current mode.
    pub fn mode(&self) -> Mode {
        *self.inner.mode.lock().unwrap()
    }

    /// Changes the mode. Only allowed before [`start`](Scheduler::start).
    ///
    /// # Errors
    ///
    /// Returns [`MetronomeError::IllegalState`] once the scheduler has
    /// started.
    pub fn set_mode(&self, mode: Mode) -> Result<()> {
        if self.inner.started.load(Ordering::SeqCst) {
            return Err(MetronomeError::IllegalState(
                "cannot change mode while the scheduler is running".to_string(),
            ));
        }
        *self.inner.mode.lock().unwrap() = mode;
        Ok(())
    }

    /// True between a successful [`start`](Scheduler::start) and
    /// [`stop`](Scheduler::stop).
    pub fn is_running(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst) && !self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Starts dispatching.
    ///
    /// In background mode this spawns the dispatch loop and returns. In
    /// foreground mode it blocks until [`stop`](Scheduler::stop) is called
    /// elsewhere or the process receives an interrupt signal.
    ///
    /// # Errors
    ///
    /// Returns [`MetronomeError::AlreadyStarted`] on a second call and
    /// [`MetronomeError::Config`] if `check_interval` is zero.
    pub async fn start(&self) -> Result<()> {
        if self.inner.config.check_interval.is_zero() {
            return Err(MetronomeError::Config(
                "check_interval must be > 0".to_string(),
            ));
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(MetronomeError::AlreadyStarted);
        }

        let mode = *self.inner.mode.lock().unwrap();
        info!(
            "Scheduler starting in {:?} mode with check interval {:?}",
            mode, self.inner.config.check_interval
        );

        match mode {
            Mode::Background => {
                let inner = Arc::clone(&self.inner);
                let handle = tokio::spawn(Self::dispatch_loop(inner));
                *self.inner.loop_handle.lock().unwrap() = Some(handle);
                Ok(())
            }
            Mode::Foreground => {
                let inner = Arc::clone(&self.inner);
                tokio::select! {
                    _ = Self::dispatch_loop(inner) => {}
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupt received, shutting down");
                    }
                }
                self.stop().await
            }
        }
    }

    /// Stops the scheduler.
    ///
    /// Signals shutdown, fires the cancellation token of every in-flight
    /// run and waits up to the configured grace period for those runs to
    /// return. Runs still going after the grace period are abandoned and
    /// their tasks marked cancelled. Calling `stop` again (or before
    /// `start`) is a no-op.
    pub async fn stop(&self) -> Result<()> {
        if !self.inner.started.load(Ordering::SeqCst)
            || self.inner.stopped.swap(true, Ordering::SeqCst)
        {
            return Ok(());
        }

        self.inner.shutdown.cancel();

        let handle = self.inner.loop_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Dispatch loop terminated abnormally: {}", e);
            }
        }

        let tasks: Vec<Arc<Task>> = {
            let tasks = self.inner.tasks.read().unwrap();
            tasks.values().cloned().collect()
        };

        for task in &tasks {
            if task.is_in_flight() {
                task.signal_cancel();
            }
        }

        let grace = self.inner.config.shutdown_grace;
        let all_idle = tokio::time::timeout(grace, async {
            for task in &tasks {
                task.wait_idle().await;
            }
        })
        .await;

        if all_idle.is_err() {
            for task in &tasks {
                if task.is_in_flight() {
                    warn!(
                        "Task '{}' did not finish within the {:?} grace period; abandoning",
                        task.spec().name(),
                        grace
                    );
                    let _ = task.cancel();
                }
            }
        }

        info!("Scheduler stopped");
        Ok(())
    }

    /// The dispatch loop: tick, then sleep until the next check or until
    /// shutdown.
    async fn dispatch_loop(inner: Arc<SchedulerInner>) {
        loop {
            Self::run_tick(&inner);

            tokio::select! {
                _ = inner.shutdown.cancelled() => break,
                _ = tokio::time::sleep(inner.config.check_interval) => {}
            }
        }
        debug!("Dispatch loop terminated");
    }

    /// One tick: snapshot the registry, select due and admitted tasks,
    /// dispatch them in priority order.
    fn run_tick(inner: &Arc<SchedulerInner>) {
        let clock = &inner.config.clock;
        let now = clock.now();
        let time_of_day = clock.time_of_day();
        trace!("Tick at {:?}", time_of_day);

        let snapshot: Vec<Arc<Task>> = {
            let tasks = inner.tasks.read().unwrap();
            tasks.values().cloned().collect()
        };

        let mut candidates: Vec<(Priority, Instant, u64, Arc<Task>)> = snapshot
            .into_iter()
            .filter_map(|task| {
                task.due_key(now, time_of_day)
                    .map(|(priority, due, seq)| (priority, due, seq, task))
            })
            .collect();

        // Priority first, then earliest due time, then registration order:
        // a deterministic schedule when many tasks are due at once.
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        for (_, _, _, task) in candidates {
            executor::dispatch(&task, clock);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("Scheduler dropped while still running!");
        }
    }
}
