//! Per-task callback fan-out.
//!
//! Each task carries a [`CallbackRegistry`] holding three independent
//! callback sets: status-change, success and failure. Notification
//! iterates a snapshot, so adding or removing callbacks during a
//! notification is safe and takes effect on the next one. A panicking
//! callback is caught, counted and logged; it never reaches scheduler
//! logic or affects sibling callbacks.
//!
//! Callbacks may be invoked concurrently from multiple workers and must
//! tolerate that.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::warn;

use crate::task::{TaskFailure, TaskStatus, TaskView};

/// Status-change callback: `(task, old_status, new_status)`.
pub type StatusCallback = Arc<dyn Fn(&TaskView, TaskStatus, TaskStatus) + Send + Sync>;

/// Success callback, fired on each successful run.
pub type SuccessCallback = Arc<dyn Fn(&TaskView) + Send + Sync>;

/// Failure callback: `(task, failure)`, fired on each failed run.
pub type FailureCallback = Arc<dyn Fn(&TaskView, &TaskFailure) + Send + Sync>;

/// Opaque token identifying a registered callback, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

pub(crate) struct CallbackRegistry {
    status: Mutex<Vec<(CallbackId, StatusCallback)>>,
    success: Mutex<Vec<(CallbackId, SuccessCallback)>>,
    failure: Mutex<Vec<(CallbackId, FailureCallback)>>,
    next_id: AtomicU64,
    swallowed: AtomicU64,
}

impl CallbackRegistry {
    pub(crate) fn new() -> Self {
        Self {
            status: Mutex::new(Vec::new()),
            success: Mutex::new(Vec::new()),
            failure: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            swallowed: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> CallbackId {
        CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn add_status(&self, callback: StatusCallback) -> CallbackId {
        let id = self.next_id();
        self.status.lock().unwrap().push((id, callback));
        id
    }

    pub(crate) fn add_success(&self, callback: SuccessCallback) -> CallbackId {
        let id = self.next_id();
        self.success.lock().unwrap().push((id, callback));
        id
    }

    pub(crate) fn add_failure(&self, callback: FailureCallback) -> CallbackId {
        let id = self.next_id();
        self.failure.lock().unwrap().push((id, callback));
        id
    }

    pub(crate) fn remove_status(&self, id: CallbackId) -> bool {
        Self::remove(&self.status, id)
    }

    pub(crate) fn remove_success(&self, id: CallbackId) -> bool {
        Self::remove(&self.success, id)
    }

    pub(crate) fn remove_failure(&self, id: CallbackId) -> bool {
        Self::remove(&self.failure, id)
    }

    fn remove<T>(set: &Mutex<Vec<(CallbackId, T)>>, id: CallbackId) -> bool {
        let mut set = set.lock().unwrap();
        let before = set.len();
        set.retain(|(cid, _)| *cid != id);
        set.len() != before
    }

    /// Number of callback panics swallowed so far.
    pub(crate) fn swallowed_count(&self) -> u64 {
        self.swallowed.load(Ordering::Relaxed)
    }

    pub(crate) fn notify_status_change(&self, view: &TaskView, old: TaskStatus, new: TaskStatus) {
        let snapshot: Vec<StatusCallback> = {
            let set = self.status.lock().unwrap();
            set.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for callback in snapshot {
            self.invoke(view, || callback(view, old, new));
        }
    }

    pub(crate) fn notify_success(&self, view: &TaskView) {
        let snapshot: Vec<SuccessCallback> = {
            let set = self.success.lock().unwrap();
            set.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for callback in snapshot {
            self.invoke(view, || callback(view));
        }
    }

    pub(crate) fn notify_failure(&self, view: &TaskView, failure: &TaskFailure) {
        let snapshot: Vec<FailureCallback> = {
            let set = self.failure.lock().unwrap();
            set.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for callback in snapshot {
            self.invoke(view, || callback(view, failure));
        }
    }

    fn invoke(&self, view: &TaskView, call: impl FnOnce()) {
        if catch_unwind(AssertUnwindSafe(call)).is_err() {
            self.swallowed.fetch_add(1, Ordering::Relaxed);
            warn!("Callback for task '{}' panicked; ignoring", view.name);
        }
    }
}
