//! Broker connection seam. [`MqttConnector`] is the production implementation;
//! tests plug in their own [`StreamConnector`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::{ConnectProperties, Filter, Packet};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions};
use rumqttc::Transport;

use super::error::StreamError;
use super::reason::ReasonCode;
use crate::auth::{AuthError, AuthenticatedSession};

const REQUEST_CHANNEL_CAPACITY: usize = 64;
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything needed to open one broker connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub keep_alive: Duration,
    pub clean_start: bool,
    /// Broker-side session lifetime in seconds.
    pub session_expiry: u32,
}

impl ConnectParams {
    /// Credentials for one attempt: the account gcid as username and the id
    /// token as password; the broker session lives as long as the token.
    pub fn from_session(
        host: impl Into<String>,
        port: u16,
        client_id: impl Into<String>,
        keep_alive: Duration,
        session: &AuthenticatedSession,
    ) -> Result<Self, StreamError> {
        let password = session
            .id_token
            .clone()
            .ok_or(StreamError::Credentials(AuthError::MissingIdToken))?;
        let session_expiry = u32::try_from(session.expires_in().as_secs()).unwrap_or(u32::MAX);
        Ok(Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            username: session.gcid.clone(),
            password,
            keep_alive,
            clean_start: false,
            session_expiry,
        })
    }
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("keep_alive", &self.keep_alive)
            .field("clean_start", &self.clean_start)
            .field("session_expiry", &self.session_expiry)
            .finish()
    }
}

/// A publish received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Outbound side of a live connection.
#[async_trait]
pub trait StreamHandle: Send + Sync {
    /// Subscribe to all `topics` at QoS 1.
    async fn subscribe(&self, topics: &[String]) -> Result<(), StreamError>;
    async fn unsubscribe(&self, topic: &str) -> Result<(), StreamError>;
    async fn disconnect(&self) -> Result<(), StreamError>;
}

/// Inbound side of a live connection.
#[async_trait]
pub trait StreamEvents: Send {
    /// Next publish. `Ok(None)` means the broker closed the connection; any
    /// error means the connection is gone.
    async fn next(&mut self) -> Result<Option<InboundMessage>, StreamError>;

    /// Drive the connection until a pending disconnect has been flushed.
    async fn shutdown(&mut self) {}
}

/// Opens broker connections. Called once per connection attempt.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(
        &self,
        params: ConnectParams,
    ) -> Result<(Arc<dyn StreamHandle>, Box<dyn StreamEvents>), StreamError>;
}

/// rumqttc-backed MQTT v5 connector over TLS.
#[derive(Debug, Clone)]
pub struct MqttConnector {
    tls: bool,
}

impl MqttConnector {
    pub fn new() -> Self {
        Self { tls: true }
    }

    /// Plain TCP, for local brokers.
    pub fn insecure() -> Self {
        Self { tls: false }
    }

    fn options(&self, params: &ConnectParams) -> MqttOptions {
        let mut options = MqttOptions::new(&params.client_id, &params.host, params.port);
        options.set_keep_alive(params.keep_alive);
        options.set_clean_start(params.clean_start);
        options.set_credentials(&params.username, &params.password);
        let mut properties = ConnectProperties::new();
        properties.session_expiry_interval = Some(params.session_expiry);
        options.set_connect_properties(properties);
        if self.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }
}

impl Default for MqttConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamConnector for MqttConnector {
    async fn connect(
        &self,
        params: ConnectParams,
    ) -> Result<(Arc<dyn StreamHandle>, Box<dyn StreamEvents>), StreamError> {
        let (client, mut event_loop) =
            AsyncClient::new(self.options(&params), REQUEST_CHANNEL_CAPACITY);

        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    tracing::debug!(
                        host = %params.host,
                        session_present = ack.session_present,
                        "broker accepted connection"
                    );
                    break;
                }
                Ok(_) => continue,
                Err(err) => return Err(connection_error(err)),
            }
        }

        Ok((
            Arc::new(MqttHandle { client }),
            Box::new(MqttEvents { event_loop }),
        ))
    }
}

struct MqttHandle {
    client: AsyncClient,
}

#[async_trait]
impl StreamHandle for MqttHandle {
    async fn subscribe(&self, topics: &[String]) -> Result<(), StreamError> {
        let filters = topics
            .iter()
            .map(|topic| Filter::new(topic.as_str(), QoS::AtLeastOnce))
            .collect::<Vec<_>>();
        self.client
            .subscribe_many(filters)
            .await
            .map_err(|e| StreamError::Subscribe(e.to_string()))
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), StreamError> {
        self.client
            .unsubscribe(topic)
            .await
            .map_err(|e| StreamError::Subscribe(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), StreamError> {
        self.client
            .disconnect()
            .await
            .map_err(|e| StreamError::Connection(e.to_string()))
    }
}

struct MqttEvents {
    event_loop: EventLoop,
}

#[async_trait]
impl StreamEvents for MqttEvents {
    async fn next(&mut self) -> Result<Option<InboundMessage>, StreamError> {
        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(Some(InboundMessage {
                        topic: String::from_utf8_lossy(&publish.topic).into_owned(),
                        payload: publish.payload.to_vec(),
                    }));
                }
                Ok(Event::Incoming(Packet::Disconnect(disconnect))) => {
                    let reason = disconnect
                        .properties
                        .and_then(|p| p.reason_string)
                        .unwrap_or_else(|| format!("{:?}", disconnect.reason_code));
                    tracing::warn!(%reason, "server requested disconnect");
                    return Ok(None);
                }
                Ok(_) => continue,
                Err(err) => return Err(connection_error(err)),
            }
        }
    }

    async fn shutdown(&mut self) {
        let flush = async {
            loop {
                match self.event_loop.poll().await {
                    Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        };
        if tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, flush).await.is_err() {
            tracing::debug!("timed out flushing disconnect");
        }
    }
}

fn connection_error(err: ConnectionError) -> StreamError {
    match err {
        ConnectionError::ConnectionRefused(code) => {
            StreamError::Connection(format!("connection refused: {}", ReasonCode::from(code)))
        }
        other => StreamError::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    fn session(id_token: Option<&str>) -> AuthenticatedSession {
        AuthenticatedSession {
            client_id: "c".into(),
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: Utc::now() + ChronoDuration::seconds(3600),
            gcid: "gcid-1".into(),
            id_token: id_token.map(str::to_string),
            scope: String::new(),
            token_type: String::new(),
        }
    }

    #[test]
    fn params_use_gcid_and_id_token() {
        let params = ConnectParams::from_session(
            "broker",
            9000,
            "cardata-rs",
            Duration::from_secs(20),
            &session(Some("id-token")),
        )
        .unwrap();
        assert_eq!(params.username, "gcid-1");
        assert_eq!(params.password, "id-token");
        assert!(!params.clean_start);
        assert!((3590..=3600).contains(&params.session_expiry));
        assert!(!format!("{params:?}").contains("id-token"));
    }

    #[test]
    fn params_require_id_token() {
        let err = ConnectParams::from_session(
            "broker",
            9000,
            "cardata-rs",
            Duration::from_secs(20),
            &session(None),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StreamError::Credentials(AuthError::MissingIdToken)
        ));
    }
}
