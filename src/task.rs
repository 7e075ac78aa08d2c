//! Task state and lifecycle.
//!
//! This module provides the per-task runtime state machine, the read-only
//! [`TaskView`] snapshot handed to callbacks, and the public [`TaskHandle`]
//! returned by [`Scheduler::register`](crate::Scheduler::register).

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::callbacks::{CallbackId, CallbackRegistry};
use crate::clock::Clock;
use crate::errors::MetronomeError;
use crate::spec::TaskSpec;
use crate::window::admits_any;
use crate::Result;

/// Represents the current state of a task.
///
/// Tasks move through these states during their lifecycle:
/// - Start as `Pending`, waiting for their next due time
/// - Move to `Running` while a dispatched run executes
/// - End each run as `Completed` or `Failed`, returning to `Pending` when
///   the next due time arrives
/// - `Paused`, `Stopped` and `Cancelled` are sticky until explicitly left
///   (`resume` for paused, `reset` for stopped/cancelled)
///
/// # Examples
///
/// ```
/// use metronome::TaskStatus;
///
/// let status = TaskStatus::Pending;
/// assert_eq!(status.to_string(), "pending");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Waiting for the next due time.
    Pending,
    /// A run is currently executing.
    Running,
    /// The last run finished successfully.
    Completed,
    /// The last run failed or timed out.
    Failed,
    /// Excluded from dispatch until resumed.
    Paused,
    /// Excluded from dispatch until reset.
    Stopped,
    /// Cancelled; excluded from dispatch until reset.
    Cancelled,
}

impl TaskStatus {
    /// True for statuses from which a due task may be dispatched.
    pub(crate) fn is_schedulable(self) -> bool {
        matches!(
            self,
            TaskStatus::Pending | TaskStatus::Completed | TaskStatus::Failed
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Paused => write!(f, "paused"),
            TaskStatus::Stopped => write!(f, "stopped"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Classifies a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The run exceeded the spec's `max_running_time`.
    Timeout,
    /// The task body returned an error or panicked.
    UserError,
}

/// Describes the most recent failed run of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    kind: FailureKind,
    message: String,
}

impl TaskFailure {
    pub(crate) fn timeout() -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: String::new(),
        }
    }

    pub(crate) fn user(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::UserError,
            message: message.into(),
        }
    }

    /// Returns the failure classification.
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Returns the failure message. Empty for timeouts, which carry no
    /// user message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Timeout => write!(f, "timed out"),
            FailureKind::UserError => write!(f, "{}", self.message),
        }
    }
}

/// Type alias for a task's boxed asynchronous body.
///
/// The body receives a [`CancellationToken`] it should poll to honor
/// cooperative cancellation; returning `Err` marks the run failed.
pub type TaskBody =
    Arc<dyn Fn(CancellationToken) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// Read-only snapshot of a task, handed to callbacks and available from
/// [`TaskHandle::view`].
#[derive(Debug, Clone)]
pub struct TaskView {
    /// The task's unique name.
    pub name: String,
    /// Status at snapshot time.
    pub status: TaskStatus,
    /// Total dispatched runs (successes plus failures plus an in-flight
    /// run, if any).
    pub run_count: u64,
    /// Runs that completed successfully.
    pub success_count: u64,
    /// Runs that failed or timed out.
    pub error_count: u64,
    /// Callback panics swallowed by the registry.
    pub callback_error_count: u64,
    /// The most recent failure, if the last run did not succeed.
    pub last_error: Option<TaskFailure>,
    /// When the most recent run started.
    pub last_run_started_at: Option<Instant>,
    /// When the most recent run finished.
    pub last_run_finished_at: Option<Instant>,
    /// When the next run becomes due.
    pub next_due_at: Instant,
}

/// Outcome of one finished run, produced by the executor.
#[derive(Debug)]
pub(crate) enum RunOutcome {
    Success,
    Failure(TaskFailure),
}

/// Result of attempting to claim a due task for execution.
pub(crate) enum Claim {
    /// The task moved to `Running`; run the body with this token.
    Started(CancellationToken),
    /// The task is no longer due or no longer schedulable.
    NotDue,
    /// The admission window closed between selection and launch; the due
    /// time was advanced by one interval without counting a run.
    WindowClosed,
}

struct RunState {
    status: TaskStatus,
    next_due_at: Instant,
    last_run_started_at: Option<Instant>,
    last_run_finished_at: Option<Instant>,
    run_count: u64,
    success_count: u64,
    error_count: u64,
    last_error: Option<TaskFailure>,
    stop_requested: bool,
    in_flight: bool,
}

/// A registered task: spec, body and runtime state.
///
/// All state mutation happens under the task's own mutex, with callback
/// notification deferred until after the lock is released.
pub(crate) struct Task {
    spec: TaskSpec,
    body: TaskBody,
    seq: u64,
    state: Mutex<RunState>,
    cancel: Mutex<CancellationToken>,
    callbacks: CallbackRegistry,
    run_finished: Notify,
}

/// A status transition pending notification, captured under the lock.
type Transition = (TaskView, TaskStatus, TaskStatus);

impl Task {
    pub(crate) fn new(spec: TaskSpec, body: TaskBody, seq: u64, now: Instant) -> Self {
        let next_due_at = if spec.start_immediately() {
            now
        } else {
            now + spec.interval()
        };

        Self {
            spec,
            body,
            seq,
            state: Mutex::new(RunState {
                status: TaskStatus::Pending,
                next_due_at,
                last_run_started_at: None,
                last_run_finished_at: None,
                run_count: 0,
                success_count: 0,
                error_count: 0,
                last_error: None,
                stop_requested: false,
                in_flight: false,
            }),
            cancel: Mutex::new(CancellationToken::new()),
            callbacks: CallbackRegistry::new(),
            run_finished: Notify::new(),
        }
    }

    pub(crate) fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    pub(crate) fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    pub(crate) fn body_future(
        &self,
        token: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        (self.body)(token)
    }

    pub(crate) fn status(&self) -> TaskStatus {
        self.state.lock().unwrap().status
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.state.lock().unwrap().in_flight
    }

    /// Cancels the task's token without touching its status. Used during
    /// scheduler shutdown to signal in-flight bodies.
    pub(crate) fn signal_cancel(&self) {
        self.cancel.lock().unwrap().cancel();
    }

    /// Waits until no run is in flight.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.run_finished.notified();
            if !self.is_in_flight() {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn view(&self) -> TaskView {
        let state = self.state.lock().unwrap();
        self.view_locked(&state)
    }

    fn view_locked(&self, state: &RunState) -> TaskView {
        TaskView {
            name: self.spec.name().to_string(),
            status: state.status,
            run_count: state.run_count,
            success_count: state.success_count,
            error_count: state.error_count,
            callback_error_count: self.callbacks.swallowed_count(),
            last_error: state.last_error.clone(),
            last_run_started_at: state.last_run_started_at,
            last_run_finished_at: state.last_run_finished_at,
            next_due_at: state.next_due_at,
        }
    }

    fn transition(
        &self,
        state: &mut MutexGuard<'_, RunState>,
        new: TaskStatus,
        out: &mut Vec<Transition>,
    ) {
        let old = state.status;
        state.status = new;
        out.push((self.view_locked(state), old, new));
    }

    fn notify_transitions(&self, transitions: Vec<Transition>) {
        for (view, old, new) in transitions {
            self.callbacks.notify_status_change(&view, old, new);
        }
    }

    /// Candidate key for the dispatch loop: `Some((priority, due, seq))`
    /// when the task is due and admitted at the given tick time.
    pub(crate) fn due_key(
        &self,
        now: Instant,
        time_of_day: chrono::NaiveTime,
    ) -> Option<(crate::Priority, Instant, u64)> {
        let state = self.state.lock().unwrap();
        if !state.status.is_schedulable() || now < state.next_due_at {
            return None;
        }
        if !admits_any(self.spec.time_windows(), time_of_day) {
            return None;
        }
        Some((self.spec.priority(), state.next_due_at, self.seq))
    }

    /// Atomically claims the task for one run.
    ///
    /// Re-checks due-ness and window admission under the lock: between
    /// selection and launch the task may have been dispatched, paused,
    /// stopped or cancelled, or the window may have closed. A closed
    /// window advances the due time by one interval without counting a
    /// run.
    pub(crate) fn try_claim(&self, now: Instant, time_of_day: chrono::NaiveTime) -> Claim {
        let token = self.cancel.lock().unwrap().clone();
        let mut transitions = Vec::new();

        let claim = {
            let mut state = self.state.lock().unwrap();
            if !state.status.is_schedulable() || now < state.next_due_at {
                Claim::NotDue
            } else if !admits_any(self.spec.time_windows(), time_of_day) {
                state.next_due_at += self.spec.interval();
                Claim::WindowClosed
            } else {
                // Outcome markers pass through Pending on their way back
                // to Running so observers see a valid status path.
                if !matches!(state.status, TaskStatus::Pending) {
                    self.transition(&mut state, TaskStatus::Pending, &mut transitions);
                }
                self.transition(&mut state, TaskStatus::Running, &mut transitions);
                state.run_count += 1;
                state.in_flight = true;
                state.last_run_started_at = Some(now);
                Claim::Started(token.child_token())
            }
        };

        self.notify_transitions(transitions);
        claim
    }

    /// Records the outcome of a finished run and schedules the next one.
    ///
    /// The next due time is anchored to the finish instant, so a slow run
    /// does not accumulate a backlog of missed ticks.
    pub(crate) fn finish_run(&self, outcome: RunOutcome, now: Instant) {
        let mut transitions = Vec::new();
        let mut success_view = None;
        let mut failure = None;

        {
            let mut state = self.state.lock().unwrap();
            state.in_flight = false;
            state.last_run_finished_at = Some(now);

            if state.status != TaskStatus::Running {
                // cancel() intervened mid-run; the run was already
                // uncounted and the body's outcome is discarded.
                drop(state);
                self.run_finished.notify_waiters();
                return;
            }

            if state.stop_requested {
                state.stop_requested = false;
                state.run_count -= 1;
                self.transition(&mut state, TaskStatus::Stopped, &mut transitions);
            } else {
                match outcome {
                    RunOutcome::Success => {
                        state.success_count += 1;
                        state.last_error = None;
                        state.next_due_at = now + self.spec.interval();
                        self.transition(&mut state, TaskStatus::Completed, &mut transitions);
                        success_view = Some(self.view_locked(&state));
                    }
                    RunOutcome::Failure(f) => {
                        state.error_count += 1;
                        state.last_error = Some(f.clone());
                        state.next_due_at = now + self.spec.interval();
                        self.transition(&mut state, TaskStatus::Failed, &mut transitions);
                        failure = Some((self.view_locked(&state), f));
                    }
                }
            }
        }

        self.run_finished.notify_waiters();
        self.notify_transitions(transitions);
        if let Some(view) = success_view {
            self.callbacks.notify_success(&view);
        }
        if let Some((view, f)) = failure {
            self.callbacks.notify_failure(&view, &f);
        }
    }

    /// Pauses the task so the dispatch loop skips it.
    pub(crate) fn pause(&self) -> Result<()> {
        let mut transitions = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            match state.status {
                TaskStatus::Paused => {}
                TaskStatus::Pending | TaskStatus::Completed | TaskStatus::Failed => {
                    self.transition(&mut state, TaskStatus::Paused, &mut transitions);
                }
                status => {
                    return Err(MetronomeError::IllegalState(format!(
                        "cannot pause task '{}' while {}",
                        self.spec.name(),
                        status
                    )))
                }
            }
        }
        self.notify_transitions(transitions);
        Ok(())
    }

    /// Resumes a paused task. The due time is kept, so a task that became
    /// due while paused runs on the next tick.
    pub(crate) fn resume(&self) -> Result<()> {
        let mut transitions = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            if state.status != TaskStatus::Paused {
                return Err(MetronomeError::IllegalState(format!(
                    "cannot resume task '{}' as it is not paused",
                    self.spec.name()
                )));
            }
            self.transition(&mut state, TaskStatus::Pending, &mut transitions);
        }
        self.notify_transitions(transitions);
        Ok(())
    }

    /// Stops the task. A running task is signalled to cancel and moves to
    /// `Stopped` once its body returns; that interrupted run is not
    /// counted. Stopping an already stopped task is a no-op.
    pub(crate) fn stop(&self) -> Result<()> {
        let mut transitions = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            match state.status {
                TaskStatus::Stopped => {}
                TaskStatus::Cancelled => {
                    return Err(MetronomeError::IllegalState(format!(
                        "cannot stop cancelled task '{}'",
                        self.spec.name()
                    )))
                }
                TaskStatus::Running => {
                    state.stop_requested = true;
                }
                _ => {
                    self.transition(&mut state, TaskStatus::Stopped, &mut transitions);
                }
            }
        }
        self.signal_cancel();
        self.notify_transitions(transitions);
        Ok(())
    }

    /// Cancels the task from any state. A running body is signalled and
    /// detached; its eventual outcome is discarded and the interrupted
    /// run is not counted.
    pub(crate) fn cancel(&self) -> Result<()> {
        let mut transitions = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            match state.status {
                TaskStatus::Cancelled => {}
                TaskStatus::Running => {
                    state.run_count -= 1;
                    state.stop_requested = false;
                    self.transition(&mut state, TaskStatus::Cancelled, &mut transitions);
                }
                _ => {
                    self.transition(&mut state, TaskStatus::Cancelled, &mut transitions);
                }
            }
        }
        self.signal_cancel();
        self.notify_transitions(transitions);
        Ok(())
    }

    /// Returns a stopped or cancelled task to `Pending` with a fresh
    /// cancellation token and a recomputed due time. Counters persist.
    pub(crate) fn reset(&self, now: Instant) -> Result<()> {
        let mut transitions = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            if state.status == TaskStatus::Running {
                return Err(MetronomeError::IllegalState(format!(
                    "cannot reset task '{}' while running",
                    self.spec.name()
                )));
            }

            *self.cancel.lock().unwrap() = CancellationToken::new();
            state.stop_requested = false;
            state.last_error = None;
            state.next_due_at = if self.spec.start_immediately() {
                now
            } else {
                now + self.spec.interval()
            };
            if state.status != TaskStatus::Pending {
                self.transition(&mut state, TaskStatus::Pending, &mut transitions);
            }
        }
        debug!("Task '{}' reset", self.spec.name());
        self.notify_transitions(transitions);
        Ok(())
    }
}

/// A cheaply clonable handle to a registered task.
///
/// Handles stay valid after [`Scheduler::remove`](crate::Scheduler::remove);
/// operations keep acting on the (now unscheduled) task object.
///
/// # Examples
///
/// ```no_run
/// use metronome::{Scheduler, TaskSpec};
///
/// # async fn example() -> metronome::Result<()> {
/// let scheduler = Scheduler::new();
/// let handle = scheduler.register(TaskSpec::every_secs(60).with_name("sync").build()?, |_ctx| async {
///     Ok(())
/// })?;
///
/// handle.pause()?;
/// assert_eq!(handle.status(), metronome::TaskStatus::Paused);
/// handle.resume()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TaskHandle {
    task: Arc<Task>,
    clock: Arc<dyn Clock>,
}

impl TaskHandle {
    pub(crate) fn new(task: Arc<Task>, clock: Arc<dyn Clock>) -> Self {
        Self { task, clock }
    }

    /// Returns the task's unique name.
    pub fn name(&self) -> &str {
        self.task.spec().name()
    }

    /// Returns the task's current status.
    pub fn status(&self) -> TaskStatus {
        self.task.status()
    }

    /// Returns a read-only snapshot of the task's state and statistics.
    pub fn view(&self) -> TaskView {
        self.task.view()
    }

    /// Pauses the task. See [`Task state machine`](TaskStatus) for the
    /// legal source states.
    ///
    /// # Errors
    ///
    /// Returns [`MetronomeError::IllegalState`] if the task is running,
    /// stopped or cancelled.
    pub fn pause(&self) -> Result<()> {
        self.task.pause()
    }

    /// Resumes a paused task without losing its due time.
    ///
    /// # Errors
    ///
    /// Returns [`MetronomeError::IllegalState`] if the task is not paused.
    pub fn resume(&self) -> Result<()> {
        self.task.resume()
    }

    /// Stops the task until [`reset`](TaskHandle::reset).
    pub fn stop(&self) -> Result<()> {
        self.task.stop()
    }

    /// Cancels the task from any state.
    pub fn cancel(&self) -> Result<()> {
        self.task.cancel()
    }

    /// Returns a stopped or cancelled task to service. Accumulated
    /// counters persist.
    pub fn reset(&self) -> Result<()> {
        self.task.reset(self.clock.now())
    }

    /// Registers a status-change callback; returns a token for removal.
    pub fn add_status_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&TaskView, TaskStatus, TaskStatus) + Send + Sync + 'static,
    {
        self.task.callbacks().add_status(Arc::new(callback))
    }

    /// Registers a success callback; returns a token for removal.
    pub fn add_success_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&TaskView) + Send + Sync + 'static,
    {
        self.task.callbacks().add_success(Arc::new(callback))
    }

    /// Registers a failure callback; returns a token for removal.
    pub fn add_failure_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&TaskView, &TaskFailure) + Send + Sync + 'static,
    {
        self.task.callbacks().add_failure(Arc::new(callback))
    }

    /// Removes a status-change callback. Returns false if the token was
    /// unknown.
    pub fn remove_status_callback(&self, id: CallbackId) -> bool {
        self.task.callbacks().remove_status(id)
    }

    /// Removes a success callback.
    pub fn remove_success_callback(&self, id: CallbackId) -> bool {
        self.task.callbacks().remove_success(id)
    }

    /// Removes a failure callback.
    pub fn remove_failure_callback(&self, id: CallbackId) -> bool {
        self.task.callbacks().remove_failure(id)
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name())
            .field("status", &self.status())
            .finish()
    }
}
