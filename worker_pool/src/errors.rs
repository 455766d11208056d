use thiserror::Error;
use tracing::error;

/// Define an error time for spawning worker threads.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkerPoolError {
    #[error("Error Initializing Multithreaded Runtime: {0:?}")]
    RuntimeInitializationError(std::io::Error),

    #[error("Worker pool must have at least one worker thread.")]
    ZeroWorkers,

    #[error("Worker pool has been shut down.")]
    PoolShutDown,

    #[error("Task Panic: {0:?}.")]
    TaskPanic(tokio::task::JoinError),

    #[error("Task cancelled; possible runtime shutdown in progress ({0}).")]
    TaskCanceled(String),

    #[error("Unknown task runtime error: {0}")]
    RuntimeError(String),
}

impl From<tokio::task::JoinError> for WorkerPoolError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            // The task panic'd.  Pass this exception on.
            error!("Panic reported on worker task: {err:?}");
            WorkerPoolError::TaskPanic(err)
        } else if err.is_cancelled() {
            // Likely caused by the pool shutting down while the task was in flight.
            WorkerPoolError::TaskCanceled(format!("{err}"))
        } else {
            WorkerPoolError::RuntimeError(format!("{err:?}"))
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkerPoolError>;
