use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Background pool configuration, typically parsed from the engine config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of worker threads. 0 = available parallelism.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Back-off applied to a task that reported no useful work, in seconds.
    /// Also the base wait when the task list is empty.
    #[serde(default = "default_sleep_seconds")]
    pub sleep_seconds: f64,
    /// Upper bound of the uniform random part added to every timed wait.
    /// Also the window over which workers de-synchronize at startup.
    #[serde(default = "default_sleep_jitter_seconds")]
    pub sleep_jitter_seconds: f64,
    /// Maximum number of candidates examined per selection pass. Tasks past
    /// this position are still reached eventually because executed tasks
    /// rotate to the back of the list.
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,
}

fn default_worker_threads() -> usize { 0 }
fn default_sleep_seconds() -> f64 { 10.0 }
fn default_sleep_jitter_seconds() -> f64 { 1.0 }
fn default_scan_limit() -> usize { 100 }

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            sleep_seconds: default_sleep_seconds(),
            sleep_jitter_seconds: default_sleep_jitter_seconds(),
            scan_limit: default_scan_limit(),
        }
    }
}

impl PoolConfig {
    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }

    /// Base idle back-off as a [`Duration`].
    pub fn sleep_duration(&self) -> Duration {
        Duration::from_secs_f64(self.sleep_seconds)
    }

    /// Whole-second back-off added to the ready time of an unproductive task.
    pub(crate) fn backoff_seconds(&self) -> i64 {
        self.sleep_seconds as i64
    }
}
