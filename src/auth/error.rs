use thiserror::Error;

/// Error code the token endpoint returns while the user has not yet approved
/// the device code.
pub const AUTHORIZATION_PENDING: &str = "authorization_pending";

/// Errors raised by the credential lifecycle.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Structured error returned by the authorization server.
    #[error("{status}: {code}: {description}")]
    Authorization {
        status: u16,
        code: String,
        description: String,
    },
    #[error("Authentication session expired")]
    SessionExpired,
    #[error("Authentication cancelled")]
    Cancelled,
    #[error("Invalid client id: {0}")]
    InvalidClientId(String),
    #[error("Session has no id token; the openid scope is required for streaming")]
    MissingIdToken,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AuthError {
    pub fn authorization(
        status: u16,
        code: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::Authorization {
            status,
            code: code.into(),
            description: description.into(),
        }
    }

    /// True for the one error the polling loop forgives: HTTP 403 carrying
    /// `authorization_pending`.
    pub fn is_authorization_pending(&self) -> bool {
        matches!(
            self,
            Self::Authorization { status: 403, code, .. } if code == AUTHORIZATION_PENDING
        )
    }

    /// HTTP status of a structured authorization error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authorization { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
