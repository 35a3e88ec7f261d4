//! Configuration system (layered: code > env > `.env` file).

use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::{
    default_session_path, AuthClient, Authenticator, FileSessionStore, PromptFn,
    DEFAULT_AUTH_SERVER,
};
use crate::error::{CardataError, Result};
use crate::stream::StreamSettings;

pub const ENV_CLIENT_ID: &str = "CARDATA_CLIENT_ID";
pub const ENV_SESSION_PATH: &str = "CARDATA_SESSION_PATH";
pub const ENV_AUTH_SERVER: &str = "CARDATA_AUTH_SERVER";
pub const ENV_STREAM_HOST: &str = "CARDATA_STREAM_HOST";
pub const ENV_STREAM_PORT: &str = "CARDATA_STREAM_PORT";
pub const ENV_MQTT_CLIENT_ID: &str = "CARDATA_MQTT_CLIENT_ID";

/// Settings needed to authenticate and stream.
///
/// Resolution order:
/// 1. Values set in code (`with_*`)
/// 2. `CARDATA_*` environment variables
/// 3. A `.env` file in the working directory
/// 4. Built-in defaults
#[derive(Debug, Clone)]
pub struct CardataConfig {
    client_id: Option<String>,
    session_path: PathBuf,
    auth_server: String,
    stream: StreamSettings,
}

impl Default for CardataConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CardataConfig {
    /// Built-in defaults only.
    pub fn new() -> Self {
        Self {
            client_id: None,
            session_path: default_session_path(),
            auth_server: DEFAULT_AUTH_SERVER.to_string(),
            stream: StreamSettings::default(),
        }
    }

    /// Load from environment variables, reading `.env` first if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new();
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(client_id) = lookup(ENV_CLIENT_ID) {
            config.client_id = Some(client_id);
        }
        if let Some(path) = lookup(ENV_SESSION_PATH) {
            config.session_path = PathBuf::from(path);
        }
        if let Some(server) = lookup(ENV_AUTH_SERVER) {
            config.auth_server = server;
        }
        if let Some(host) = lookup(ENV_STREAM_HOST) {
            config.stream.host = host;
        }
        if let Some(port) = lookup(ENV_STREAM_PORT) {
            match port.parse::<u16>() {
                Ok(port) => config.stream.port = port,
                Err(_) => tracing::warn!(%port, "ignoring invalid CARDATA_STREAM_PORT"),
            }
        }
        if let Some(mqtt_client_id) = lookup(ENV_MQTT_CLIENT_ID) {
            config.stream.client_id = mqtt_client_id;
        }
        config
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = path.into();
        self
    }

    pub fn with_auth_server(mut self, server: impl Into<String>) -> Self {
        self.auth_server = server.into();
        self
    }

    pub fn with_stream_settings(mut self, stream: StreamSettings) -> Self {
        self.stream = stream;
        self
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn session_path(&self) -> &std::path::Path {
        &self.session_path
    }

    pub fn auth_server(&self) -> &str {
        &self.auth_server
    }

    pub fn stream_settings(&self) -> &StreamSettings {
        &self.stream
    }

    /// Authenticator persisting to the configured session file.
    pub fn authenticator(&self, prompt: PromptFn) -> Result<Authenticator> {
        let client_id = self.client_id.clone().ok_or_else(|| {
            CardataError::Configuration(format!("{ENV_CLIENT_ID} is not set"))
        })?;
        let transport = AuthClient::new().with_auth_server(&self.auth_server);
        Ok(Authenticator::new(client_id, prompt)?
            .with_store(Arc::new(FileSessionStore::new(&self.session_path)))
            .with_transport(Arc::new(transport)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = CardataConfig::from_lookup(|_| None);
        assert!(config.client_id().is_none());
        assert_eq!(config.auth_server(), DEFAULT_AUTH_SERVER);
        assert_eq!(config.stream_settings().port, 9000);
        assert!(config.session_path().ends_with(".cardata/session.json"));
    }

    #[test]
    fn reads_cardata_variables() {
        let config = CardataConfig::from_lookup(lookup(&[
            (ENV_CLIENT_ID, "c0ffee00-0000-4000-8000-000000000000"),
            (ENV_SESSION_PATH, "/tmp/s.json"),
            (ENV_AUTH_SERVER, "http://localhost:1234"),
            (ENV_STREAM_HOST, "localhost"),
            (ENV_STREAM_PORT, "1883"),
            (ENV_MQTT_CLIENT_ID, "tester"),
        ]));
        assert_eq!(
            config.client_id(),
            Some("c0ffee00-0000-4000-8000-000000000000")
        );
        assert_eq!(config.session_path(), std::path::Path::new("/tmp/s.json"));
        assert_eq!(config.auth_server(), "http://localhost:1234");
        assert_eq!(config.stream_settings().host, "localhost");
        assert_eq!(config.stream_settings().port, 1883);
        assert_eq!(config.stream_settings().client_id, "tester");
    }

    #[test]
    fn invalid_port_keeps_default() {
        let config = CardataConfig::from_lookup(lookup(&[(ENV_STREAM_PORT, "ninety")]));
        assert_eq!(config.stream_settings().port, 9000);
    }

    #[test]
    fn code_overrides_env() {
        let config = CardataConfig::from_lookup(lookup(&[(ENV_CLIENT_ID, "from-env")]))
            .with_client_id("from-code");
        assert_eq!(config.client_id(), Some("from-code"));
    }

    #[test]
    fn authenticator_requires_client_id() {
        let err = CardataConfig::new()
            .authenticator(Arc::new(|_| {}))
            .err()
            .unwrap();
        assert!(matches!(err, CardataError::Configuration(_)));
    }
}
