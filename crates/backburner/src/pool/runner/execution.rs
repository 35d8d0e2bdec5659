use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{error, warn};

use crate::pool::context::TaskContext;
use crate::pool::list::UNLINKED;

use super::PoolShared;

impl PoolShared {
    /// Worker thread body. Runs until shutdown is observed.
    pub(super) fn worker_loop(&self) {
        let mut rng = SmallRng::from_entropy();

        // Workers spawned together would otherwise scan in lockstep.
        std::thread::sleep(Duration::from_secs_f64(self.jitter(&mut rng)));

        while !self.shutdown.load(Ordering::Acquire) {
            let (task, min_ready_at) = {
                let mut tasks = self.lock_tasks();
                self.select_next(&mut tasks)
            };

            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            let Some(task) = task else {
                self.timed_wait(self.config.sleep_seconds + self.jitter(&mut rng));
                continue;
            };

            let now = Utc::now().timestamp();
            if min_ready_at > now {
                // Nothing is due yet. A wake may reshuffle the list during
                // the nap, so re-select afterwards instead of committing to
                // this task.
                self.timed_wait((min_ready_at - now) as f64 + self.jitter(&mut rng));
                continue;
            }

            let mut failed = false;
            let mut done_work = false;
            {
                // Shared for the whole invocation; several workers may hold
                // it for the same task at once. Removal takes the exclusive
                // side to drain us.
                let _exec = match task.exec_lock.read() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if task.is_removed() {
                    continue;
                }

                let mut context = TaskContext::new(self);
                self.active_tasks.fetch_add(1, Ordering::Relaxed);
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| (task.function)(&mut context)));
                self.active_tasks.fetch_sub(1, Ordering::Relaxed);
                // Dropping the context rolls its counter contribution back.
                drop(context);

                match outcome {
                    Ok(Ok(did_work)) => done_work = did_work,
                    Ok(Err(err)) => {
                        failed = true;
                        warn!("Background task failed: {:#}", err);
                    }
                    Err(payload) => {
                        failed = true;
                        let message = panic_message(payload.as_ref());
                        error!("Background task panicked: {}", message);
                    }
                }
            }

            if !failed {
                // A productive task is eligible again immediately, an idle
                // one sleeps out the base interval. Written under the tasks
                // mutex after the shared lock is released; if removal
                // unlinked the task in between there is nothing to update.
                let backoff = if done_work { 0 } else { self.config.backoff_seconds() };
                let mut tasks = self.lock_tasks();
                let slot = task.slot();
                if slot != UNLINKED {
                    tasks.set_ready_at(slot, Utc::now().timestamp() + backoff);
                }
            }

            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            if failed {
                // Dampen a misbehaving task instead of spinning on it.
                self.timed_wait(self.config.sleep_seconds);
            }
        }
    }

    /// Park on the wake event for up to `seconds`. Returns early when
    /// woken; the caller re-selects either way.
    fn timed_wait(&self, seconds: f64) {
        let tasks = self.lock_tasks();
        if self.shutdown.load(Ordering::Acquire) {
            return;
        }
        let _ = self
            .wake_event
            .wait_timeout(tasks, Duration::from_secs_f64(seconds.max(0.0)));
    }

    fn jitter(&self, rng: &mut SmallRng) -> f64 {
        let part = self.config.sleep_jitter_seconds;
        if part > 0.0 {
            rng.gen_range(0.0..part)
        } else {
            0.0
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
