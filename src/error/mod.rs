//! Error types for cardata.

use thiserror::Error;

use crate::auth::AuthError;
use crate::stream::StreamError;

/// Primary error type for all cardata operations.
#[derive(Error, Debug)]
pub enum CardataError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CardataError {
    /// True when the failure came from the caller cancelling the operation.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Auth(AuthError::Cancelled) | Self::Stream(StreamError::Cancelled)
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CardataError>;
