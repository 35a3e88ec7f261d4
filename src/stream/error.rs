use thiserror::Error;

use crate::auth::AuthError;

/// Errors raised by the streaming connection.
#[derive(Debug, Error)]
pub enum StreamError {
    /// No usable credential for the connection attempt.
    #[error("Credential error: {0}")]
    Credentials(AuthError),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Subscribe error: {0}")]
    Subscribe(String),
    /// Inbound payload was not a valid streamed message.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Stream cancelled")]
    Cancelled,
}

impl From<AuthError> for StreamError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Cancelled => Self::Cancelled,
            other => Self::Credentials(other),
        }
    }
}
