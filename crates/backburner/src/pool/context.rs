use std::collections::HashMap;

use super::runner::PoolShared;

/// Handed to a task for the duration of one invocation.
///
/// Counter increments are applied to the pool immediately and recorded
/// locally; when the context goes out of scope the local record is
/// subtracted back out, on normal return, error and panic alike. The pool's
/// counters therefore gauge in-flight work across currently executing
/// tasks, not cumulative totals.
pub struct TaskContext<'a> {
    pool: &'a PoolShared,
    diff: HashMap<String, i64>,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(pool: &'a PoolShared) -> Self {
        Self {
            pool,
            diff: HashMap::new(),
        }
    }

    /// Add `delta` to the pool counter `name` for the duration of this
    /// invocation.
    pub fn increment(&mut self, name: &str, delta: i64) {
        self.pool.add_to_counter(name, delta);
        *self.diff.entry(name.to_string()).or_insert(0) += delta;
    }
}

impl Drop for TaskContext<'_> {
    fn drop(&mut self) {
        if !self.diff.is_empty() {
            self.pool.roll_back_counters(&self.diff);
        }
    }
}
