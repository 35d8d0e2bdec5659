use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

use tracing::{error, info};

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::pool::context::TaskContext;
use crate::pool::list::{TaskList, UNLINKED};
use crate::pool::metrics::PoolMetrics;
use crate::pool::task::{TaskHandle, TaskInfo};

/// State shared between the pool facade, its workers and task handles.
pub(crate) struct PoolShared {
    pub(crate) config: PoolConfig,
    /// Guards the task list, including the per-task ready times and slots.
    tasks: Mutex<TaskList>,
    /// Paired exclusively with the tasks mutex.
    pub(crate) wake_event: Condvar,
    pub(crate) shutdown: AtomicBool,
    counters: Mutex<HashMap<String, i64>>,
    /// Gauge of task invocations currently executing.
    pub(crate) active_tasks: AtomicUsize,
}

impl PoolShared {
    pub(crate) fn new(config: PoolConfig) -> Self {
        Self {
            config,
            tasks: Mutex::new(TaskList::new()),
            wake_event: Condvar::new(),
            shutdown: AtomicBool::new(false),
            counters: Mutex::new(HashMap::new()),
            active_tasks: AtomicUsize::new(0),
        }
    }

    /// Lock the task list. No user code ever runs under this lock, so a
    /// poisoned guard still protects a consistent list and is recovered.
    pub(crate) fn lock_tasks(&self) -> MutexGuard<'_, TaskList> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn get_counter(&self, name: &str) -> i64 {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn add_to_counter(&self, name: &str, delta: i64) {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *counters.entry(name.to_string()).or_insert(0) += delta;
    }

    /// Subtract a task's local counter contribution back out. Runs on every
    /// exit path and must not panic.
    pub(crate) fn roll_back_counters(&self, diff: &HashMap<String, i64>) {
        match self.counters.lock() {
            Ok(mut counters) => {
                for (name, delta) in diff {
                    *counters.entry(name.clone()).or_insert(0) -= delta;
                }
            }
            Err(_) => error!("Counter rollback skipped: counters lock poisoned"),
        }
    }

    /// Flip the shutdown flag under the tasks mutex so a parked worker
    /// cannot check the flag and then miss the broadcast.
    pub(crate) fn begin_shutdown(&self) {
        {
            let _tasks = self.lock_tasks();
            self.shutdown.store(true, Ordering::Release);
        }
        self.wake_event.notify_all();
    }
}

/// Fixed-size pool of worker threads cooperatively running a dynamic set of
/// recurring maintenance tasks.
///
/// Workers compete for the shared task list, each repeatedly selecting the
/// task with the earliest ready time, executing it, and rotating it to the
/// back of the list. The same task may execute on several workers at once.
pub struct BackgroundPool {
    shared: Arc<PoolShared>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl BackgroundPool {
    /// Create a pool with `worker_threads` workers (0 = available
    /// parallelism) and default tunables. Workers start immediately.
    pub fn new(worker_threads: usize) -> Result<Self, PoolError> {
        Self::with_config(PoolConfig {
            worker_threads,
            ..PoolConfig::default()
        })
    }

    pub fn with_config(config: PoolConfig) -> Result<Self, PoolError> {
        let worker_threads = config.resolved_worker_threads();
        info!("Starting background pool with {} workers", worker_threads);

        let shared = Arc::new(PoolShared::new(config));
        let mut workers = Vec::with_capacity(worker_threads);

        for index in 0..worker_threads {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("bg-pool-{index}"))
                .spawn(move || worker_shared.worker_loop());

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    // Partial-construction cleanup: stop what already started.
                    shared.begin_shutdown();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(PoolError::Spawn(err));
                }
            }
        }

        Ok(Self { shared, workers })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Register a task. It is inserted at the front of the list and
    /// considered immediately; every idle worker is notified since a new
    /// task may make many of them productive.
    pub fn add_task<F>(&self, function: F) -> TaskHandle
    where
        F: Fn(&mut TaskContext<'_>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        let task = Arc::new(TaskInfo::new(
            Box::new(function),
            Arc::downgrade(&self.shared),
        ));

        {
            let mut tasks = self.shared.lock_tasks();
            let slot = tasks.push_front(Arc::clone(&task));
            task.set_slot(slot);
        }
        self.shared.wake_event.notify_all();

        TaskHandle::new(task)
    }

    /// Retire a task. Idempotent, and safe to call from any thread,
    /// including from inside another task.
    ///
    /// Blocks until every in-flight invocation of the task has finished;
    /// once this returns the task is never invoked again.
    pub fn remove_task(&self, handle: &TaskHandle) {
        let task = handle.info();
        if task.mark_removed() {
            return;
        }

        // Drain barrier: the exclusive acquisition cannot succeed until
        // every worker holding the shared side has finished its invocation.
        // The lock outcome is irrelevant, crossing it is the point.
        drop(task.exec_lock.write());

        let mut tasks = self.shared.lock_tasks();
        let slot = task.slot();
        if slot != UNLINKED {
            tasks.remove(slot);
            task.set_slot(UNLINKED);
        }
    }

    /// Current value of a pool counter (0 if never incremented).
    pub fn get_counter(&self, name: &str) -> i64 {
        self.shared.get_counter(name)
    }

    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            active_tasks: self.shared.active_tasks.load(Ordering::Relaxed),
            registered_tasks: self.shared.lock_tasks().len(),
        }
    }
}

impl Drop for BackgroundPool {
    fn drop(&mut self) {
        self.shared.begin_shutdown();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("Background pool worker panicked during shutdown");
            }
        }
        info!("Background pool stopped");
    }
}
