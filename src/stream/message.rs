use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One telemetry push from the streaming broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamedMessage {
    pub vin: String,
    #[serde(rename = "entityId", default)]
    pub entity_id: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub data: HashMap<String, StreamedDataDetails>,
}

/// A single data point inside a [`StreamedMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamedDataDetails {
    pub value: StreamedDataValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Data point value, typed after the JSON value it was sent as.
///
/// Integral JSON numbers become [`StreamedDataValue::Int`]; anything with a
/// fraction or exponent becomes [`StreamedDataValue::Float`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamedDataValue {
    String(String),
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl StreamedDataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl std::fmt::Display for StreamedDataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}
