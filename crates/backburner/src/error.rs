use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
