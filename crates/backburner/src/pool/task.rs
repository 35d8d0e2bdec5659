use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

use chrono::Utc;

use super::context::TaskContext;
use super::list::UNLINKED;
use super::runner::PoolShared;

/// A maintenance task body. Returns `Ok(true)` when it found useful work,
/// `Ok(false)` when there was nothing to do. Invocations of the same task
/// may overlap on several workers, so the body must tolerate re-entry.
pub(crate) type TaskFn =
    Box<dyn Fn(&mut TaskContext<'_>) -> anyhow::Result<bool> + Send + Sync>;

/// Per-task record shared between the pool's task list and external handles.
pub(crate) struct TaskInfo {
    pub(crate) function: TaskFn,
    /// Monotonic false -> true. A removed task is never selected again.
    removed: AtomicBool,
    /// Held shared by every worker executing this task, exclusively (and
    /// only briefly) by removal to drain in-flight executions.
    pub(crate) exec_lock: RwLock<()>,
    /// Position in the pool's task list, [`UNLINKED`] once erased.
    /// Only read and written under the pool's tasks mutex.
    slot: AtomicUsize,
    pool: Weak<PoolShared>,
}

impl TaskInfo {
    pub(crate) fn new(function: TaskFn, pool: Weak<PoolShared>) -> Self {
        Self {
            function,
            removed: AtomicBool::new(false),
            exec_lock: RwLock::new(()),
            slot: AtomicUsize::new(UNLINKED),
            pool,
        }
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Flip the removed flag, returning the previous value.
    pub(crate) fn mark_removed(&self) -> bool {
        self.removed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot.load(Ordering::Relaxed)
    }

    pub(crate) fn set_slot(&self, slot: usize) {
        self.slot.store(slot, Ordering::Relaxed);
    }
}

/// Shared-ownership handle to a registered task.
///
/// The pool's task list co-owns the record, so the handle stays valid across
/// removal; dropping the last handle after removal frees the task.
#[derive(Clone)]
pub struct TaskHandle {
    info: Arc<TaskInfo>,
}

impl TaskHandle {
    pub(crate) fn new(info: Arc<TaskInfo>) -> Self {
        Self { info }
    }

    pub(crate) fn info(&self) -> &Arc<TaskInfo> {
        &self.info
    }

    /// Ask the pool to run this task as soon as possible: the task moves to
    /// the front of the list and any pending back-off is cancelled.
    ///
    /// Only one idle worker is notified. If every worker is busy the signal
    /// is lost, but the lowered ready time is observed on the next selection
    /// pass anyway.
    pub fn wake(&self) {
        if self.info.is_removed() {
            return;
        }
        let Some(pool) = self.info.pool.upgrade() else {
            return;
        };

        let now = Utc::now().timestamp();
        {
            let mut tasks = pool.lock_tasks();
            let slot = self.info.slot();
            if slot == UNLINKED {
                return;
            }
            tasks.move_to_front(slot);
            if tasks.ready_at(slot) > now {
                tasks.set_ready_at(slot, now);
            }
        }
        pool.wake_event.notify_one();
    }
}
