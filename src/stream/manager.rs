use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bon::Builder;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use super::error::StreamError;
use super::message::StreamedMessage;
use super::registry::Snapshot;
use super::topic::VehicleKey;
use super::transport::{ConnectParams, InboundMessage, StreamConnector, StreamEvents, StreamHandle};
use crate::auth::SessionProvider;

pub const DEFAULT_STREAM_HOST: &str = "customer.streaming-cardata.bmwgroup.com";
pub const DEFAULT_STREAM_PORT: u16 = 9000;
pub const DEFAULT_MQTT_CLIENT_ID: &str = "cardata-rs";

/// Receives every error the stream recovers from.
pub type ErrorCallback = Arc<dyn Fn(&StreamError) + Send + Sync>;

/// Broker endpoint and reconnection tuning.
#[derive(Debug, Clone, Builder)]
pub struct StreamSettings {
    #[builder(default = DEFAULT_STREAM_HOST.to_string(), into)]
    pub host: String,
    #[builder(default = DEFAULT_STREAM_PORT)]
    pub port: u16,
    #[builder(default = DEFAULT_MQTT_CLIENT_ID.to_string(), into)]
    pub client_id: String,
    #[builder(default = Duration::from_secs(20))]
    pub keep_alive: Duration,
    /// Wait before reconnect attempt `n` is `n * backoff_step`.
    #[builder(default = Duration::from_secs(10))]
    pub backoff_step: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl StreamSettings {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }
}

struct LiveConnection {
    handle: Arc<dyn StreamHandle>,
    gcid: String,
}

/// One streaming connection lifetime.
///
/// Owns the reconnect loop, keeps broker subscriptions in line with the
/// installed [`Snapshot`], and fans inbound messages out to callbacks.
/// A manager is single-use: once cancelled it never connects again.
pub struct StreamManager {
    settings: StreamSettings,
    provider: Arc<dyn SessionProvider>,
    connector: Arc<dyn StreamConnector>,
    on_error: Option<ErrorCallback>,
    cancel: CancellationToken,
    finished: CancellationToken,
    started: AtomicBool,
    live: Mutex<Option<LiveConnection>>,
    snapshot: RwLock<Arc<Snapshot>>,
    connected: watch::Sender<bool>,
}

impl StreamManager {
    pub fn new(
        settings: StreamSettings,
        provider: Arc<dyn SessionProvider>,
        connector: Arc<dyn StreamConnector>,
        snapshot: Arc<Snapshot>,
    ) -> Self {
        Self {
            settings,
            provider,
            connector,
            on_error: None,
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
            started: AtomicBool::new(false),
            live: Mutex::new(None),
            snapshot: RwLock::new(snapshot),
            connected: watch::channel(false).0,
        }
    }

    pub fn with_on_error(mut self, on_error: Option<ErrorCallback>) -> Self {
        self.on_error = on_error;
        self
    }

    /// Start the run loop and wait for the first successful connection.
    pub async fn connect(self: &Arc<Self>) -> Result<(), StreamError> {
        if self.cancel.is_cancelled() {
            return Err(StreamError::Cancelled);
        }
        if !self.started.swap(true, Ordering::SeqCst) {
            tokio::spawn(self.clone().run());
        }

        let mut connected = self.connected.subscribe();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StreamError::Cancelled),
            _ = self.finished.cancelled() => Err(StreamError::Connection(
                "stream task exited before connecting".to_string(),
            )),
            result = connected.wait_for(|up| *up) => result
                .map(|_| ())
                .map_err(|_| StreamError::Cancelled),
        }
    }

    /// Stop the run loop. Use [`StreamManager::done`] to wait for teardown.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// True once the run loop has exited, whether stopped or crashed.
    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Resolves once the run loop has disconnected and exited. Immediate for
    /// a manager that was never started.
    pub async fn done(&self) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        self.finished.cancelled().await;
    }

    /// Install a new subscription snapshot.
    ///
    /// On a live connection, keys that disappeared are unsubscribed and new
    /// keys are subscribed right away; otherwise the next connect picks them up.
    /// A snapshot older than the installed one is ignored.
    pub async fn update_subscriptions(&self, snapshot: Arc<Snapshot>) {
        let live = self.live.lock().await;
        let previous = {
            let mut current = self
                .snapshot
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if snapshot.version() < current.version() {
                tracing::trace!(
                    stale = snapshot.version(),
                    installed = current.version(),
                    "ignoring stale subscription snapshot"
                );
                return;
            }
            std::mem::replace(&mut *current, snapshot.clone())
        };

        let Some(live) = live.as_ref() else {
            return;
        };

        let (removed, added) = diff_keys(&previous, &snapshot);
        for key in removed {
            let topic = key.topic(&live.gcid);
            match live.handle.unsubscribe(&topic).await {
                Ok(()) => tracing::debug!(%topic, "unsubscribed"),
                Err(err) => self.report(&err),
            }
        }
        if !added.is_empty() {
            let topics = added
                .iter()
                .map(|key| key.topic(&live.gcid))
                .collect::<Vec<_>>();
            match live.handle.subscribe(&topics).await {
                Ok(()) => tracing::debug!(topics = ?topics, "subscribed"),
                Err(err) => self.report(&err),
            }
        }
    }

    fn current_snapshot(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn run(self: Arc<Self>) {
        // Fires `done` even if this task unwinds.
        let _finished = self.finished.clone().drop_guard();
        let mut failures: u32 = 0;

        loop {
            if failures > 0 {
                let wait = self.settings.backoff(failures);
                tracing::info!(attempt = failures, wait_secs = wait.as_secs(), "reconnecting");
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
            }

            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(StreamError::Cancelled),
                result = self.establish() => result,
            };
            let mut events = match attempt {
                Ok(events) => events,
                Err(StreamError::Cancelled) => break,
                Err(err) => {
                    failures = failures.saturating_add(1);
                    tracing::warn!(attempt = failures, error = %err, "connection attempt failed");
                    self.report(&err);
                    continue;
                }
            };

            let lost = self.pump(events.as_mut()).await;
            self.connected.send_replace(false);
            let live = self.live.lock().await.take();

            match lost {
                Some(err) => {
                    tracing::warn!(error = %err, "connection lost");
                    self.report(&err);
                    failures = 1;
                }
                None => {
                    if let Some(live) = live {
                        if let Err(err) = live.handle.disconnect().await {
                            tracing::debug!(error = %err, "disconnect failed");
                        }
                        events.shutdown().await;
                    }
                    break;
                }
            }
        }

        self.connected.send_replace(false);
        self.live.lock().await.take();
        tracing::info!("stream stopped");
    }

    /// One connection attempt with fresh credentials.
    async fn establish(&self) -> Result<Box<dyn StreamEvents>, StreamError> {
        let session = self.provider.get_session(&self.cancel).await?;
        let params = ConnectParams::from_session(
            &self.settings.host,
            self.settings.port,
            &self.settings.client_id,
            self.settings.keep_alive,
            &session,
        )?;

        tracing::debug!(host = %params.host, port = params.port, "connecting");
        let (handle, events) = self.connector.connect(params).await?;

        let mut live = self.live.lock().await;
        let topics = self
            .current_snapshot()
            .keys()
            .map(|key| key.topic(&session.gcid))
            .collect::<Vec<_>>();
        if !topics.is_empty() {
            match handle.subscribe(&topics).await {
                Ok(()) => tracing::info!(topics = ?topics, "subscribed"),
                Err(err) => self.report(&err),
            }
        }
        *live = Some(LiveConnection {
            handle,
            gcid: session.gcid.clone(),
        });
        drop(live);

        self.connected.send_replace(true);
        tracing::info!(gcid = %session.gcid, "stream connected");
        Ok(events)
    }

    /// Pump inbound messages until cancellation (`None`) or connection loss.
    async fn pump(&self, events: &mut dyn StreamEvents) -> Option<StreamError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                next = events.next() => next,
            };
            match next {
                Ok(Some(message)) => self.dispatch(message),
                Ok(None) => {
                    return Some(StreamError::Connection(
                        "connection closed by broker".to_string(),
                    ))
                }
                Err(err) => return Some(err),
            }
        }
    }

    fn dispatch(&self, inbound: InboundMessage) {
        let message: StreamedMessage = match serde_json::from_slice(&inbound.payload) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(topic = %inbound.topic, error = %err, "dropping undecodable message");
                self.report(&StreamError::Decode(err));
                return;
            }
        };

        let callbacks = self.current_snapshot().callbacks_for(&message.vin);
        tracing::trace!(vin = %message.vin, subscribers = callbacks.len(), "dispatching");
        for callback in callbacks {
            let message = message.clone();
            tokio::spawn(async move { callback(message) });
        }
    }

    fn report(&self, err: &StreamError) {
        if let Some(on_error) = &self.on_error {
            on_error(err);
        }
    }
}

fn diff_keys(previous: &Snapshot, next: &Snapshot) -> (Vec<VehicleKey>, Vec<VehicleKey>) {
    let before = previous.keys().collect::<HashSet<_>>();
    let after = next.keys().collect::<HashSet<_>>();
    let removed = before.difference(&after).map(|k| (*k).clone()).collect();
    let added = after.difference(&before).map(|k| (*k).clone()).collect();
    (removed, added)
}
