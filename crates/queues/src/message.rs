use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::queue::MessageBrokerQueue;

/// Wire-format message envelope for queue traffic.
///
/// Envelopes are serialized with MessagePack. The `queue` field travels as
/// its routing key, so an envelope naming an unregistered key fails to
/// decode. Payloads are opaque to this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Queue this message was published to.
    pub queue: MessageBrokerQueue,

    /// MessagePack-encoded payload bytes.
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,

    /// When this message was created.
    pub timestamp: DateTime<Utc>,

    /// Correlation ID for tracing a message across producers and consumers.
    pub correlation_id: Uuid,

    /// Payload schema version. Consumers should check this before decoding.
    #[serde(default = "default_version")]
    pub version: u16,
}

fn default_version() -> u16 {
    1
}

impl Message {
    /// Create a new message, serializing the payload with MessagePack.
    pub fn new<T: Serialize>(
        queue: MessageBrokerQueue,
        payload: &T,
    ) -> Result<Self, rmp_serde::encode::Error> {
        Self::with_correlation(queue, payload, Uuid::new_v4())
    }

    /// Create a message that continues an existing correlation.
    pub fn with_correlation<T: Serialize>(
        queue: MessageBrokerQueue,
        payload: &T,
        correlation_id: Uuid,
    ) -> Result<Self, rmp_serde::encode::Error> {
        Ok(Self {
            queue,
            payload: rmp_serde::to_vec(payload)?,
            timestamp: Utc::now(),
            correlation_id,
            version: 1,
        })
    }

    /// The routing key this message is published under.
    pub fn routing_key(&self) -> &'static str {
        self.queue.routing_key()
    }

    /// Deserialize the payload into the expected type.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, rmp_serde::decode::Error> {
        rmp_serde::from_slice(&self.payload)
    }

    /// Serialize the whole envelope to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    /// Deserialize an envelope from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// Serde adapter writing `Vec<u8>` as a MessagePack bin rather than an array.
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
