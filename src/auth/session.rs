use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Safety margin applied when deciding whether a session is still usable, so
/// a token never expires halfway through a handshake.
pub const EXPIRY_MARGIN_SECS: i64 = 10;

/// In-flight device-authorization state.
///
/// Only lives for the duration of one device flow; it cannot authenticate
/// anything by itself and is never persisted.
#[derive(Debug, Clone)]
pub struct AuthenticationSession {
    pub client_id: String,
    pub user_code: String,
    pub device_code: String,
    /// Polling interval in seconds; `0` when the server did not send one.
    pub interval_secs: u64,
    pub verification_uri: String,
    pub verification_uri_complete: String,
    pub expires_in_secs: u64,
    pub verifier: String,
}

/// What the user needs to see to approve a device code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationPrompt {
    pub verification_uri: String,
    pub user_code: String,
    pub verification_uri_complete: String,
}

impl From<&AuthenticationSession> for VerificationPrompt {
    fn from(session: &AuthenticationSession) -> Self {
        Self {
            verification_uri: session.verification_uri.clone(),
            user_code: session.user_code.clone(),
            verification_uri_complete: session.verification_uri_complete.clone(),
        }
    }
}

/// Credential issued by the authorization server.
///
/// Holds live secrets: the access token for REST calls, the id token used as
/// the streaming password, and the refresh token.
///
/// # Example
/// ```
/// use cardata::auth::AuthenticatedSession;
/// use chrono::{Duration, Utc};
///
/// let session = AuthenticatedSession {
///     client_id: "c0ffee00-0000-4000-8000-000000000000".to_string(),
///     access_token: "access".to_string(),
///     refresh_token: "refresh".to_string(),
///     expires_at: Utc::now() + Duration::hours(1),
///     gcid: "gcid".to_string(),
///     id_token: None,
///     scope: "openid".to_string(),
///     token_type: "Bearer".to_string(),
/// };
/// assert!(!session.is_expired());
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedSession {
    #[serde(alias = "ClientID")]
    pub client_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub gcid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub token_type: String,
}

impl AuthenticatedSession {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) >= self.expires_at
    }

    /// Remaining lifetime, clamped at zero.
    pub fn expires_in(&self) -> std::time::Duration {
        (self.expires_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }

    pub fn matches_client(&self, client_id: &str) -> bool {
        self.client_id.eq_ignore_ascii_case(client_id)
    }
}

impl std::fmt::Debug for AuthenticatedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedSession")
            .field("client_id", &self.client_id)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("gcid", &self.gcid)
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish()
    }
}
