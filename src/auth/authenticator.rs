use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::client::{AuthClient, AuthTransport, Scope};
use super::error::AuthError;
use super::session::{AuthenticatedSession, VerificationPrompt};
use super::store::{InMemorySessionStore, SessionStore};

/// Polling interval used when the server does not suggest one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Called once per device flow with the URL and code the user must confirm.
pub type PromptFn = Arc<dyn Fn(&VerificationPrompt) + Send + Sync>;

/// Anything that can hand out a currently valid session.
///
/// The streaming manager asks for one on every connection attempt.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn get_session(
        &self,
        cancel: &CancellationToken,
    ) -> Result<AuthenticatedSession, AuthError>;
}

/// Device-flow authenticator.
///
/// Owns the credential lifecycle: cached session, refresh, and falling back
/// to a fresh device authorization whenever neither works.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use cardata::auth::{Authenticator, FileSessionStore};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), cardata::auth::AuthError> {
/// let auth = Authenticator::new(
///     "c0ffee00-0000-4000-8000-000000000000",
///     Arc::new(|prompt| println!("Open {} and enter {}", prompt.verification_uri, prompt.user_code)),
/// )?
/// .with_store(Arc::new(FileSessionStore::new_default()));
///
/// let session = auth.get_session(&CancellationToken::new()).await?;
/// println!("gcid: {}", session.gcid);
/// # Ok(())
/// # }
/// ```
pub struct Authenticator {
    client_id: String,
    scopes: Vec<Scope>,
    prompt: PromptFn,
    store: Arc<dyn SessionStore>,
    transport: Arc<dyn AuthTransport>,
    flight: tokio::sync::Mutex<()>,
}

impl Authenticator {
    pub fn new(client_id: impl Into<String>, prompt: PromptFn) -> Result<Self, AuthError> {
        let client_id = client_id.into();
        if client_id.trim().is_empty() {
            return Err(AuthError::InvalidClientId(client_id));
        }
        Ok(Self {
            client_id,
            scopes: Scope::defaults(),
            prompt,
            store: Arc::new(InMemorySessionStore::new()),
            transport: Arc::new(AuthClient::new()),
            flight: tokio::sync::Mutex::new(()),
        })
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<Scope>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn AuthTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// Session currently in the store, without refreshing or prompting.
    pub fn stored_session(&self) -> Result<Option<AuthenticatedSession>, AuthError> {
        self.store.get()
    }

    /// Return a valid session, refreshing or re-authorizing as needed.
    ///
    /// Concurrent callers are serialized; a caller that waited sees the
    /// session the previous one stored.
    pub async fn get_session(
        &self,
        cancel: &CancellationToken,
    ) -> Result<AuthenticatedSession, AuthError> {
        let _flight = cancellable(cancel, async { Ok(self.flight.lock().await) }).await?;

        let stored = match self.store.get() {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::debug!("no stored session");
                return self.device_flow(cancel).await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to read stored session");
                return self.device_flow(cancel).await;
            }
        };

        if !stored.matches_client(&self.client_id) {
            tracing::info!("stored session belongs to another client id");
            return self.device_flow(cancel).await;
        }

        if !stored.is_expired() {
            return Ok(stored);
        }

        match self.refresh(&stored, cancel).await {
            Ok(session) => Ok(session),
            Err(AuthError::Cancelled) => Err(AuthError::Cancelled),
            Err(err) => {
                tracing::warn!(error = %err, "token refresh failed, starting device flow");
                self.device_flow(cancel).await
            }
        }
    }

    /// Run a full device authorization regardless of any stored session.
    pub async fn new_session(
        &self,
        cancel: &CancellationToken,
    ) -> Result<AuthenticatedSession, AuthError> {
        let _flight = cancellable(cancel, async { Ok(self.flight.lock().await) }).await?;
        self.device_flow(cancel).await
    }

    /// Forget the stored session.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.store.clear()
    }

    async fn refresh(
        &self,
        stored: &AuthenticatedSession,
        cancel: &CancellationToken,
    ) -> Result<AuthenticatedSession, AuthError> {
        tracing::debug!(expires_at = %stored.expires_at, "session expired, refreshing");
        let session = cancellable(
            cancel,
            self.transport
                .refresh_token(&self.client_id, &stored.refresh_token),
        )
        .await?;
        self.store.save(&session)?;
        Ok(session)
    }

    async fn device_flow(
        &self,
        cancel: &CancellationToken,
    ) -> Result<AuthenticatedSession, AuthError> {
        let pending = cancellable(
            cancel,
            self.transport
                .initiate_authentication_session(&self.client_id, &self.scopes),
        )
        .await?;

        let deadline = Instant::now() + Duration::from_secs(pending.expires_in_secs);
        let interval = match pending.interval_secs {
            0 => DEFAULT_POLL_INTERVAL,
            secs => Duration::from_secs(secs),
        };

        (self.prompt)(&VerificationPrompt::from(&pending));
        tracing::info!(
            verification_uri = %pending.verification_uri,
            expires_in = pending.expires_in_secs,
            "waiting for device authorization"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AuthError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }
            if Instant::now() >= deadline {
                return Err(AuthError::SessionExpired);
            }

            match cancellable(cancel, self.transport.poll_auth_token(&pending)).await {
                Ok(session) => {
                    self.store.save(&session)?;
                    tracing::info!(gcid = %session.gcid, "device authorization complete");
                    return Ok(session);
                }
                Err(err) if err.is_authorization_pending() => {
                    tracing::trace!("authorization pending");
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl SessionProvider for Authenticator {
    async fn get_session(
        &self,
        cancel: &CancellationToken,
    ) -> Result<AuthenticatedSession, AuthError> {
        Authenticator::get_session(self, cancel).await
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, AuthError>>,
) -> Result<T, AuthError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AuthError::Cancelled),
        result = fut => result,
    }
}
