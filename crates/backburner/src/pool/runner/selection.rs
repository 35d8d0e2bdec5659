use std::sync::Arc;

use crate::pool::list::TaskList;
use crate::pool::task::TaskInfo;

use super::PoolShared;

impl PoolShared {
    /// Pick the task with the minimal ready time among the first
    /// `scan_limit` live entries, then rotate it to the back of the list.
    ///
    /// The rotation is the tie-breaker: among tasks with equal ready times
    /// the one just considered is demoted, so its peers get a turn. Together
    /// with wake's splice-to-front this approximates LRU-under-ready-time
    /// without a heap. Tasks past the scan cap are reached as executed tasks
    /// rotate out of the window.
    ///
    /// Returns the chosen task and its ready time; `None` when the list has
    /// no live entries in the window.
    pub(super) fn select_next(&self, tasks: &mut TaskList) -> (Option<Arc<TaskInfo>>, i64) {
        let mut chosen: Option<(usize, Arc<TaskInfo>)> = None;
        let mut min_ready_at = i64::MAX;

        let mut examined = 0;
        for (slot, task, ready_at) in tasks.iter() {
            if task.is_removed() {
                continue;
            }
            if ready_at < min_ready_at {
                min_ready_at = ready_at;
                chosen = Some((slot, Arc::clone(task)));
            }
            examined += 1;
            if examined >= self.config.scan_limit {
                break;
            }
        }

        match chosen {
            Some((slot, task)) => {
                tasks.move_to_back(slot);
                (Some(task), min_ready_at)
            }
            None => (None, 0),
        }
    }
}
