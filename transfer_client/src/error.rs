use thiserror::Error;
use tokio::task::JoinError;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Configuration Error: {0}")]
    ConfigurationError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Redirect received (location: {0})")]
    RedirectReceived(String),

    #[error("Invalid Content-Length header: {0}")]
    InvalidContentLength(String),

    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Reqwest Error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Upload body error: {0}")]
    UploadBodyError(String),

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Other Internal Error: {0}")]
    InternalError(String),
}

impl TransferError {
    /// True for errors that stem from bad configuration rather than the transport.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            TransferError::ConfigurationError(_) | TransferError::InvalidUrl(_) | TransferError::UnsupportedProtocol(_)
        )
    }
}

// Define our own result type here (this seems to be the standard).
pub type Result<T> = std::result::Result<T, TransferError>;

impl PartialEq for TransferError {
    fn eq(&self, other: &TransferError) -> bool {
        match (self, other) {
            (TransferError::RedirectReceived(a), TransferError::RedirectReceived(b)) => a == b,
            (e1, e2) => std::mem::discriminant(e1) == std::mem::discriminant(e2),
        }
    }
}

impl From<JoinError> for TransferError {
    fn from(value: JoinError) -> Self {
        TransferError::InternalError(format!("{value:?}"))
    }
}
