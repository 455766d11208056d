//! Error types for speed-test sessions

use thiserror::Error;
use transfer_client::TransferError;
use worker_pool::WorkerPoolError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] WorkerPoolError),

    #[error("A session is already active")]
    AlreadyActive,

    #[error("No active session")]
    NoActiveSession,

    #[error("Timed out waiting for the session to finish")]
    Timeout,
}

impl SessionError {
    /// Errors caused by the session's inputs rather than the network.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            SessionError::Configuration(_) => true,
            SessionError::Transfer(e) => e.is_configuration_error(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
