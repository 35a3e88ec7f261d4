use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use strum::{AsRefStr, Display, EnumString};

use super::error::AuthError;
use super::pkce::{Challenger, S256Challenger};
use super::session::{AuthenticatedSession, AuthenticationSession};

pub const DEFAULT_AUTH_SERVER: &str = "https://customer.bmwgroup.com";
pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
pub const REFRESH_TOKEN_GRANT_TYPE: &str = "refresh_token";

const DEVICE_CODE_PATH: &str = "/gcdm/oauth/device/code";
const TOKEN_PATH: &str = "/gcdm/oauth/token";

/// OAuth scopes understood by the CarData authorization server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum Scope {
    #[strum(serialize = "openid")]
    OpenId,
    #[strum(serialize = "authenticate_user")]
    AuthenticateUser,
    #[strum(serialize = "cardata:api:read")]
    ApiRead,
    #[strum(serialize = "cardata:streaming:read")]
    StreamingRead,
}

impl Scope {
    /// Scopes requested when the caller does not choose any.
    pub fn defaults() -> Vec<Scope> {
        vec![
            Scope::OpenId,
            Scope::ApiRead,
            Scope::StreamingRead,
            Scope::AuthenticateUser,
        ]
    }
}

/// The three authorization-server calls the device flow is built from.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    async fn initiate_authentication_session(
        &self,
        client_id: &str,
        scopes: &[Scope],
    ) -> Result<AuthenticationSession, AuthError>;

    /// One token poll. A pending authorization comes back as an
    /// [`AuthError::Authorization`] with status 403.
    async fn poll_auth_token(
        &self,
        session: &AuthenticationSession,
    ) -> Result<AuthenticatedSession, AuthError>;

    async fn refresh_token(
        &self,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<AuthenticatedSession, AuthError>;
}

/// reqwest-backed [`AuthTransport`] talking to the CarData authorization server.
///
/// # Example
/// ```no_run
/// use cardata::auth::AuthClient;
///
/// let client = AuthClient::new().with_auth_server("http://127.0.0.1:8080");
/// ```
pub struct AuthClient {
    http: reqwest::Client,
    auth_server: String,
    challenger: Arc<dyn Challenger>,
}

impl AuthClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            auth_server: DEFAULT_AUTH_SERVER.to_string(),
            challenger: Arc::new(S256Challenger),
        }
    }

    pub fn with_auth_server(mut self, server: impl Into<String>) -> Self {
        self.auth_server = server.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_challenger(mut self, challenger: Arc<dyn Challenger>) -> Self {
        self.challenger = challenger;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn auth_server(&self) -> &str {
        &self.auth_server
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<reqwest::Response, AuthError> {
        let url = format!("{}{path}", self.auth_server);
        let resp = self
            .http
            .post(url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::OK {
            return Ok(resp);
        }
        Err(error_from_response(resp).await)
    }

    async fn token_request(
        &self,
        client_id: &str,
        form: &[(&str, &str)],
    ) -> Result<AuthenticatedSession, AuthError> {
        let resp = self.post_form(TOKEN_PATH, form).await?;
        let payload: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        payload.into_session(client_id)
    }
}

impl Default for AuthClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthTransport for AuthClient {
    async fn initiate_authentication_session(
        &self,
        client_id: &str,
        scopes: &[Scope],
    ) -> Result<AuthenticationSession, AuthError> {
        let client_id = parse_client_id(client_id)?;
        let pkce = self.challenger.generate();
        let scope = scopes
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(" ");

        tracing::debug!(server = %self.auth_server, "requesting device code");
        let resp = self
            .post_form(
                DEVICE_CODE_PATH,
                &[
                    ("client_id", client_id.as_str()),
                    ("response_type", "device_code"),
                    ("scope", scope.as_str()),
                    ("code_challenge", pkce.challenge.as_str()),
                    ("code_challenge_method", pkce.method),
                ],
            )
            .await?;
        let payload: DeviceCodeResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        Ok(AuthenticationSession {
            client_id,
            user_code: payload.user_code,
            device_code: payload.device_code,
            interval_secs: payload.interval.unwrap_or(0),
            verification_uri: payload.verification_uri,
            verification_uri_complete: payload.verification_uri_complete.unwrap_or_default(),
            expires_in_secs: payload.expires_in,
            verifier: pkce.verifier,
        })
    }

    async fn poll_auth_token(
        &self,
        session: &AuthenticationSession,
    ) -> Result<AuthenticatedSession, AuthError> {
        self.token_request(
            &session.client_id,
            &[
                ("grant_type", DEVICE_CODE_GRANT_TYPE),
                ("client_id", session.client_id.as_str()),
                ("device_code", session.device_code.as_str()),
                ("code_verifier", session.verifier.as_str()),
            ],
        )
        .await
    }

    async fn refresh_token(
        &self,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<AuthenticatedSession, AuthError> {
        let client_id = parse_client_id(client_id)?;
        tracing::debug!(server = %self.auth_server, "refreshing token");
        self.token_request(
            &client_id,
            &[
                ("grant_type", REFRESH_TOKEN_GRANT_TYPE),
                ("client_id", client_id.as_str()),
                ("refresh_token", refresh_token),
            ],
        )
        .await
    }
}

fn parse_client_id(client_id: &str) -> Result<String, AuthError> {
    uuid::Uuid::parse_str(client_id)
        .map(|id| id.hyphenated().to_string())
        .map_err(|_| AuthError::InvalidClientId(client_id.to_string()))
}

async fn error_from_response(resp: reqwest::Response) -> AuthError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => AuthError::authorization(
            status,
            err.error.unwrap_or_default(),
            err.error_description.unwrap_or_default(),
        ),
        Err(_) => AuthError::authorization(status, "", body),
    }
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    user_code: String,
    device_code: String,
    verification_uri: String,
    #[serde(default)]
    verification_uri_complete: Option<String>,
    expires_in: u64,
    #[serde(default)]
    interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    gcid: String,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    token_type: String,
}

impl TokenResponse {
    fn into_session(self, client_id: &str) -> Result<AuthenticatedSession, AuthError> {
        let expires_at = Duration::try_seconds(self.expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                AuthError::InvalidResponse(format!("expires_in out of range: {}", self.expires_in))
            })?;
        Ok(AuthenticatedSession {
            client_id: client_id.to_string(),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            gcid: self.gcid,
            id_token: self.id_token,
            scope: self.scope,
            token_type: self.token_type,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}
