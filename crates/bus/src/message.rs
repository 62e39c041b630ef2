use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Content type of every payload herald publishes.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Wire-format envelope carried through the queue broker.
///
/// The envelope itself is MessagePack-encoded for compact transport; the
/// payload inside is a self-describing JSON document so consumers in any
/// language can read it. `exchange` and `routing_key` drive broker-side
/// routing, `headers` carry string metadata alongside the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique per envelope. Returned to HTTP callers as the acknowledgement id.
    pub message_id: Uuid,

    /// Exchange the envelope was published to.
    pub exchange: String,

    /// Dot-separated routing key, matched against queue bindings.
    pub routing_key: String,

    pub content_type: String,

    pub headers: BTreeMap<String, String>,

    /// Encoded payload bytes (see `content_type`).
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,

    /// When this envelope was created.
    pub timestamp: DateTime<Utc>,

    /// Schema version for forward-compatible evolution.
    #[serde(default = "default_version")]
    pub version: u16,
}

/// Default version for envelopes that omit the field.
fn default_version() -> u16 {
    1
}

impl Envelope {
    /// Create an envelope carrying `payload` as JSON.
    pub fn json<T: Serialize>(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            message_id: Uuid::new_v4(),
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            content_type: CONTENT_TYPE_JSON.to_string(),
            headers: BTreeMap::new(),
            payload: serde_json::to_vec(payload)?,
            timestamp: Utc::now(),
            version: 1,
        })
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Deserialize the JSON payload into the expected type.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    /// Serialize this entire envelope to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    /// Deserialize an envelope from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// Helper module for serde to handle `Vec<u8>` as raw bytes in MessagePack.
mod serde_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(d)?;
        Ok(bytes.to_vec())
    }
}
