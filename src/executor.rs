//! Single-invocation execution.
//!
//! The executor claims a due task, runs its body on a dedicated worker and
//! records the outcome. A `max_running_time` limit is enforced by racing
//! the worker against a timer: on expiry the run is counted as a timeout
//! failure and the body is left to wind down in the background with its
//! cancellation token fired. The body is never forcibly terminated; the
//! scheduler merely stops waiting for it.

use std::sync::Arc;

use log::{debug, error, trace, warn};
use tokio::task::JoinError;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::task::{Claim, RunOutcome, Task, TaskFailure};

/// Attempts to start one run of the task.
///
/// Non-blocking: the body runs on its own worker, so a slow task never
/// stalls the dispatch loop. Returns true if a run was started. The claim
/// silently aborts when the task was dispatched, paused, stopped or
/// cancelled since selection, and advances the due time when its window
/// closed in that gap.
pub(crate) fn dispatch(task: &Arc<Task>, clock: &Arc<dyn Clock>) -> bool {
    match task.try_claim(clock.now(), clock.time_of_day()) {
        Claim::Started(token) => {
            debug!("Dispatching task '{}'", task.spec().name());
            let task = Arc::clone(task);
            let clock = Arc::clone(clock);
            tokio::spawn(run_invocation(task, clock, token));
            true
        }
        Claim::WindowClosed => {
            trace!(
                "Task '{}' window closed before launch; skipping",
                task.spec().name()
            );
            false
        }
        Claim::NotDue => false,
    }
}

async fn run_invocation(task: Arc<Task>, clock: Arc<dyn Clock>, token: CancellationToken) {
    let name = task.spec().name();
    let mut worker = tokio::spawn(task.body_future(token.clone()));

    let outcome = match task.spec().max_running_time() {
        Some(limit) => {
            tokio::select! {
                result = &mut worker => outcome_from_join(name, result),
                _ = sleep(limit) => {
                    warn!(
                        "Task '{}' exceeded max running time of {:?}; abandoning run",
                        name, limit
                    );
                    // Fire the token and walk away; the worker handle is
                    // dropped, leaving the body to finish detached.
                    token.cancel();
                    RunOutcome::Failure(TaskFailure::timeout())
                }
            }
        }
        None => outcome_from_join(name, worker.await),
    };

    task.finish_run(outcome, clock.now());
}

fn outcome_from_join(name: &str, result: Result<crate::Result<()>, JoinError>) -> RunOutcome {
    match result {
        Ok(Ok(())) => {
            debug!("Task '{}' completed successfully", name);
            RunOutcome::Success
        }
        Ok(Err(e)) => {
            error!("Task '{}' failed: {}", name, e);
            RunOutcome::Failure(TaskFailure::user(e.to_string()))
        }
        Err(join_error) if join_error.is_panic() => {
            let payload = join_error.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "task body panicked".to_string());
            error!("Task '{}' panicked: {}", name, message);
            RunOutcome::Failure(TaskFailure::user(message))
        }
        Err(_) => RunOutcome::Failure(TaskFailure::user("task worker aborted".to_string())),
    }
}
