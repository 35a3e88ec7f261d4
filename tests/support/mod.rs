#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cardata::auth::{
    AuthError, AuthTransport, AuthenticatedSession, AuthenticationSession, Scope, SessionProvider,
    SessionStore,
};
use cardata::stream::{
    ConnectParams, InboundMessage, StreamConnector, StreamError, StreamEvents, StreamHandle,
};
use chrono::{Duration, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const CLIENT_ID: &str = "c0ffee00-0000-4000-8000-000000000000";

pub fn session(access_token: &str, expires_in_secs: i64) -> AuthenticatedSession {
    AuthenticatedSession {
        client_id: CLIENT_ID.to_string(),
        access_token: access_token.to_string(),
        refresh_token: "ref".to_string(),
        expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        gcid: "gcid-1".to_string(),
        id_token: Some("id-token".to_string()),
        scope: "openid".to_string(),
        token_type: "Bearer".to_string(),
    }
}

pub fn pending_session(interval_secs: u64, expires_in_secs: u64) -> AuthenticationSession {
    AuthenticationSession {
        client_id: CLIENT_ID.to_string(),
        user_code: "USER-1234".to_string(),
        device_code: "dev-code".to_string(),
        interval_secs,
        verification_uri: "https://example.test/device".to_string(),
        verification_uri_complete: "https://example.test/device?code=USER-1234".to_string(),
        expires_in_secs,
        verifier: "verifier".to_string(),
    }
}

pub fn pending_error() -> AuthError {
    AuthError::authorization(403, "authorization_pending", "waiting for user")
}

/// Session store with call counters and an optional read failure.
#[derive(Default)]
pub struct RecordingStore {
    session: Mutex<Option<AuthenticatedSession>>,
    fail_get: bool,
    fail_save: bool,
    pub saves: AtomicUsize,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(session: AuthenticatedSession) -> Self {
        let store = Self::default();
        *store.session.lock().expect("store lock") = Some(session);
        store
    }

    pub fn failing_get() -> Self {
        Self {
            fail_get: true,
            ..Self::default()
        }
    }

    pub fn failing_save(session: AuthenticatedSession) -> Self {
        let store = Self {
            fail_save: true,
            ..Self::default()
        };
        *store.session.lock().expect("store lock") = Some(session);
        store
    }

    pub fn current(&self) -> Option<AuthenticatedSession> {
        self.session.lock().expect("store lock").clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl SessionStore for RecordingStore {
    fn get(&self) -> Result<Option<AuthenticatedSession>, AuthError> {
        if self.fail_get {
            return Err(AuthError::Io("disk on fire".to_string()));
        }
        Ok(self.current())
    }

    fn save(&self, session: &AuthenticatedSession) -> Result<(), AuthError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_save {
            return Err(AuthError::Io("read-only".to_string()));
        }
        *self.session.lock().expect("store lock") = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        *self.session.lock().expect("store lock") = None;
        Ok(())
    }
}

/// Auth transport that replays queued responses and counts calls.
#[derive(Default)]
pub struct ScriptedTransport {
    initiations: Mutex<VecDeque<Result<AuthenticationSession, AuthError>>>,
    polls: Mutex<VecDeque<Result<AuthenticatedSession, AuthError>>>,
    refreshes: Mutex<VecDeque<Result<AuthenticatedSession, AuthError>>>,
    pub initiate_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_initiate(self, result: Result<AuthenticationSession, AuthError>) -> Self {
        self.initiations.lock().expect("lock").push_back(result);
        self
    }

    pub fn on_poll(self, result: Result<AuthenticatedSession, AuthError>) -> Self {
        self.polls.lock().expect("lock").push_back(result);
        self
    }

    pub fn on_refresh(self, result: Result<AuthenticatedSession, AuthError>) -> Self {
        self.refreshes.lock().expect("lock").push_back(result);
        self
    }

    pub fn initiates(&self) -> usize {
        self.initiate_calls.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

fn next<T>(queue: &Mutex<VecDeque<Result<T, AuthError>>>) -> Result<T, AuthError> {
    queue
        .lock()
        .expect("lock")
        .pop_front()
        .unwrap_or_else(|| Err(AuthError::InvalidResponse("script exhausted".to_string())))
}

#[async_trait]
impl AuthTransport for ScriptedTransport {
    async fn initiate_authentication_session(
        &self,
        _client_id: &str,
        _scopes: &[Scope],
    ) -> Result<AuthenticationSession, AuthError> {
        self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        next(&self.initiations)
    }

    async fn poll_auth_token(
        &self,
        _session: &AuthenticationSession,
    ) -> Result<AuthenticatedSession, AuthError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        next(&self.polls)
    }

    async fn refresh_token(
        &self,
        _client_id: &str,
        _refresh_token: &str,
    ) -> Result<AuthenticatedSession, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        next(&self.refreshes)
    }
}

/// Provider handing out one fixed session.
pub struct FixedProvider {
    session: Result<AuthenticatedSession, AuthError>,
    pub calls: AtomicUsize,
}

impl FixedProvider {
    pub fn new(session: AuthenticatedSession) -> Self {
        Self {
            session: Ok(session),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            session: Err(AuthError::SessionExpired),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for FixedProvider {
    async fn get_session(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<AuthenticatedSession, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.session {
            Ok(session) => Ok(session.clone()),
            Err(_) => Err(AuthError::SessionExpired),
        }
    }
}

/// Provider whose first call panics, as a buggy credential source would.
pub struct PanicOnceProvider {
    session: AuthenticatedSession,
    panicked: AtomicBool,
}

impl PanicOnceProvider {
    pub fn new(session: AuthenticatedSession) -> Self {
        Self {
            session,
            panicked: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SessionProvider for PanicOnceProvider {
    async fn get_session(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<AuthenticatedSession, AuthError> {
        if !self.panicked.swap(true, Ordering::SeqCst) {
            panic!("credential source blew up");
        }
        Ok(self.session.clone())
    }
}

/// What a fake broker connection saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    Subscribe(Vec<String>),
    Unsubscribe(String),
    Disconnect,
}

type EventSender = mpsc::UnboundedSender<Result<Option<InboundMessage>, StreamError>>;

/// In-process connector: every connection gets a channel the test can push
/// inbound messages (or connection loss) into.
#[derive(Default)]
pub struct FakeConnector {
    failures_left: AtomicUsize,
    pub params: Mutex<Vec<ConnectParams>>,
    attempted_at: Mutex<Vec<tokio::time::Instant>>,
    pub calls: Arc<Mutex<Vec<BrokerCall>>>,
    senders: Mutex<Vec<EventSender>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the first `n` connection attempts.
    pub fn failing_first(n: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    pub fn connect_count(&self) -> usize {
        self.params.lock().expect("lock").len()
    }

    /// When each connection attempt happened, on tokio's clock.
    pub fn attempt_times(&self) -> Vec<tokio::time::Instant> {
        self.attempted_at.lock().expect("lock").clone()
    }

    pub fn broker_calls(&self) -> Vec<BrokerCall> {
        self.calls.lock().expect("lock").clone()
    }

    /// Push a raw payload into the most recent connection.
    pub fn push(&self, topic: &str, payload: &str) {
        let senders = self.senders.lock().expect("lock");
        let sender = senders.last().expect("no connection yet");
        let _ = sender.send(Ok(Some(InboundMessage {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
        })));
    }

    /// Drop the most recent connection as if the network failed.
    pub fn drop_connection(&self) {
        let senders = self.senders.lock().expect("lock");
        if let Some(sender) = senders.last() {
            let _ = sender.send(Err(StreamError::Connection("reset by peer".to_string())));
        }
    }
}

#[async_trait]
impl StreamConnector for FakeConnector {
    async fn connect(
        &self,
        params: ConnectParams,
    ) -> Result<(Arc<dyn StreamHandle>, Box<dyn StreamEvents>), StreamError> {
        self.params.lock().expect("lock").push(params);
        self.attempted_at
            .lock()
            .expect("lock")
            .push(tokio::time::Instant::now());
        let refused = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(StreamError::Connection("refused".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().expect("lock").push(tx);
        Ok((
            Arc::new(FakeHandle {
                calls: self.calls.clone(),
            }),
            Box::new(FakeEvents { rx }),
        ))
    }
}

struct FakeHandle {
    calls: Arc<Mutex<Vec<BrokerCall>>>,
}

#[async_trait]
impl StreamHandle for FakeHandle {
    async fn subscribe(&self, topics: &[String]) -> Result<(), StreamError> {
        let mut sorted = topics.to_vec();
        sorted.sort();
        self.calls
            .lock()
            .expect("lock")
            .push(BrokerCall::Subscribe(sorted));
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), StreamError> {
        self.calls
            .lock()
            .expect("lock")
            .push(BrokerCall::Unsubscribe(topic.to_string()));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StreamError> {
        self.calls.lock().expect("lock").push(BrokerCall::Disconnect);
        Ok(())
    }
}

struct FakeEvents {
    rx: mpsc::UnboundedReceiver<Result<Option<InboundMessage>, StreamError>>,
}

#[async_trait]
impl StreamEvents for FakeEvents {
    async fn next(&mut self) -> Result<Option<InboundMessage>, StreamError> {
        match self.rx.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }
}

pub fn message_json(vin: &str) -> String {
    serde_json::json!({
        "vin": vin,
        "entityId": "entity",
        "topic": vin,
        "timestamp": "2025-01-01T00:00:00Z",
        "data": {
            "vehicle.mileage": {"value": 100, "unit": "km"}
        }
    })
    .to_string()
}
