pub mod config;
pub mod error;
pub mod ledger;
pub mod pool;

pub use config::PoolConfig;
pub use error::PoolError;
pub use ledger::{FileSizeLedger, LedgerError};
pub use pool::{BackgroundPool, PoolMetrics, TaskContext, TaskHandle};
