//! Client facade: subscriptions plus the lifetime of the event stream.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio_util::sync::CancellationToken;

use crate::auth::SessionProvider;
use crate::config::CardataConfig;
use crate::error::{CardataError, Result};
use crate::stream::{
    ErrorCallback, MqttConnector, StreamConnector, StreamManager, StreamSettings,
    StreamedMessage, Subscription, SubscriptionRegistry, VehicleKey,
};

/// Entry point for streaming vehicle telemetry.
///
/// Subscriptions can be added before or after the stream starts; the live
/// connection is kept in line with them. At most one stream runs at a time.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use cardata::{CardataConfig, Client, VehicleKey};
///
/// # async fn run() -> cardata::Result<()> {
/// let config = CardataConfig::from_env();
/// let auth = config.authenticator(Arc::new(|p| println!("{}", p.verification_uri_complete)))?;
/// let client = Client::new(Arc::new(auth)).with_stream_settings(config.stream_settings().clone());
///
/// client
///     .subscribe(VehicleKey::vin("WBA00000000000000"), |msg| println!("{msg:?}"))
///     .await?;
/// client.start_event_stream().await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    provider: Arc<dyn SessionProvider>,
    connector: Arc<dyn StreamConnector>,
    settings: StreamSettings,
    on_error: Option<ErrorCallback>,
    registry: SubscriptionRegistry,
    stream: ArcSwapOption<StreamManager>,
}

impl Client {
    pub fn new(provider: Arc<dyn SessionProvider>) -> Self {
        Self {
            provider,
            connector: Arc::new(MqttConnector::new()),
            settings: StreamSettings::default(),
            on_error: None,
            registry: SubscriptionRegistry::new(),
            stream: ArcSwapOption::empty(),
        }
    }

    /// Client with a file-backed authenticator and stream settings from `config`.
    pub fn from_config(config: &CardataConfig, prompt: crate::auth::PromptFn) -> Result<Self> {
        let authenticator = config.authenticator(prompt)?;
        Ok(Self::new(Arc::new(authenticator)).with_stream_settings(config.stream_settings().clone()))
    }

    pub fn with_connector(mut self, connector: Arc<dyn StreamConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_stream_settings(mut self, settings: StreamSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_on_error(mut self, on_error: ErrorCallback) -> Self {
        self.on_error = Some(on_error);
        self
    }

    /// `Authorization` header value for CarData REST calls.
    pub async fn bearer_token(&self, cancel: &CancellationToken) -> Result<String> {
        let session = self.provider.get_session(cancel).await?;
        Ok(format!("Bearer {}", session.access_token))
    }

    /// Register `callback` for messages matching `key`.
    pub async fn subscribe<F>(&self, key: VehicleKey, callback: F) -> Result<Subscription>
    where
        F: Fn(StreamedMessage) + Send + Sync + 'static,
    {
        if let VehicleKey::Vin(vin) = &key {
            if vin.trim().is_empty() {
                return Err(CardataError::InvalidArgument(
                    "vin must not be empty".to_string(),
                ));
            }
        }

        let (subscription, snapshot) = self.registry.register(key, Arc::new(callback));
        tracing::debug!(key = %subscription.key(), id = %subscription.id(), "subscribed");
        if let Some(manager) = self.stream.load_full() {
            manager.update_subscriptions(snapshot).await;
        }
        Ok(subscription)
    }

    /// Remove a subscription. Unknown subscriptions are ignored.
    pub async fn unsubscribe(&self, subscription: &Subscription) {
        let Some(snapshot) = self.registry.remove(subscription) else {
            return;
        };
        tracing::debug!(key = %subscription.key(), id = %subscription.id(), "unsubscribed");
        if let Some(manager) = self.stream.load_full() {
            manager.update_subscriptions(snapshot).await;
        }
    }

    /// Start the event stream and wait until it is connected.
    ///
    /// A no-op when a stream is already running.
    pub async fn start_event_stream(&self) -> Result<()> {
        let candidate = Arc::new(
            StreamManager::new(
                self.settings.clone(),
                self.provider.clone(),
                self.connector.clone(),
                self.registry.snapshot(),
            )
            .with_on_error(self.on_error.clone()),
        );

        // A manager whose run loop already exited (it crashed) may be replaced.
        let current = self.stream.load_full();
        let replaceable = current.as_ref().map_or(true, |m| m.is_finished());
        let won = replaceable && {
            let previous = self.stream.compare_and_swap(&current, Some(candidate.clone()));
            match ((*previous).as_ref(), current.as_ref()) {
                (None, None) => true,
                (Some(prev), Some(cur)) => Arc::ptr_eq(prev, cur),
                _ => false,
            }
        };
        if !won {
            candidate.cancel();
            tracing::debug!("event stream already running");
            return Ok(());
        }
        if current.is_some() {
            tracing::warn!("replacing event stream whose task exited");
        }

        // Registrations racing the swap only reached the registry.
        candidate
            .update_subscriptions(self.registry.snapshot())
            .await;
        candidate.connect().await?;
        Ok(())
    }

    /// Stop the event stream and wait for it to tear down. A no-op when none
    /// is running.
    pub async fn stop_event_stream(&self) {
        let Some(current) = self.stream.load_full() else {
            return;
        };
        let previous = self.stream.compare_and_swap(&current, None);
        let won = (*previous)
            .as_ref()
            .is_some_and(|prev| Arc::ptr_eq(prev, &current));
        if !won {
            return;
        }
        current.cancel();
        current.done().await;
        tracing::info!("event stream stopped");
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.load().is_some()
    }

    /// Resolves once the running stream (if any) has fully shut down.
    pub async fn done(&self) {
        if let Some(manager) = self.stream.load_full() {
            manager.done().await;
        }
    }
}

impl Drop for Client {
    /// Cancels a running stream; its task disconnects in the background.
    fn drop(&mut self) {
        if let Some(manager) = self.stream.swap(None) {
            manager.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, AuthenticatedSession};
    use async_trait::async_trait;

    struct NoSession;

    #[async_trait]
    impl SessionProvider for NoSession {
        async fn get_session(
            &self,
            _cancel: &CancellationToken,
        ) -> std::result::Result<AuthenticatedSession, AuthError> {
            Err(AuthError::SessionExpired)
        }
    }

    #[tokio::test]
    async fn rejects_empty_vin() {
        let client = Client::new(Arc::new(NoSession));
        let err = client
            .subscribe(VehicleKey::vin(""), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, CardataError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn stop_without_stream_is_noop() {
        let client = Client::new(Arc::new(NoSession));
        client.stop_event_stream().await;
        client.done().await;
        assert!(!client.is_streaming());
    }

    #[tokio::test]
    async fn unsubscribe_unknown_is_noop() {
        let client = Client::new(Arc::new(NoSession));
        let sub = client.subscribe(VehicleKey::AnyVehicle, |_| {}).await.unwrap();
        client.unsubscribe(&sub).await;
        client.unsubscribe(&sub).await;
    }

    #[tokio::test]
    async fn bearer_token_propagates_auth_errors() {
        let client = Client::new(Arc::new(NoSession));
        let err = client
            .bearer_token(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CardataError::Auth(AuthError::SessionExpired)));
    }
}
