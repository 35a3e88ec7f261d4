//! Multiplexed MQTT telemetry stream.

pub mod error;
pub mod manager;
pub mod message;
pub mod reason;
pub mod registry;
pub mod topic;
pub mod transport;

pub use error::StreamError;
pub use manager::{
    ErrorCallback, StreamManager, StreamSettings, DEFAULT_MQTT_CLIENT_ID, DEFAULT_STREAM_HOST,
    DEFAULT_STREAM_PORT,
};
pub use message::{StreamedDataDetails, StreamedDataValue, StreamedMessage};
pub use reason::ReasonCode;
pub use registry::{Callback, Snapshot, Subscription, SubscriptionRegistry};
pub use topic::VehicleKey;
pub use transport::{
    ConnectParams, InboundMessage, MqttConnector, StreamConnector, StreamEvents, StreamHandle,
};
