use serde::Serialize;

/// Point-in-time gauges exposed by the pool to the engine's dashboard.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PoolMetrics {
    /// Task invocations currently executing across all workers.
    pub active_tasks: usize,
    /// Registered tasks, including ones waiting out a back-off.
    pub registered_tasks: usize,
}
