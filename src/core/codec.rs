//! # Message Codec
//!
//! Encodes typed messages into frame payloads and back.
//!
//! Messages are JSON objects whose `type` field names the variant. Message
//! enums opt into this layout with `#[serde(tag = "type")]`, so decoding is a
//! single dispatch on the discriminator: a payload either names a known
//! variant and carries that variant's fields, or it is rejected.
//!
//! ## Usage
//! ```rust
//! use realtime_sync::core::codec;
//! use realtime_sync::protocol::message::IncomingMessage;
//!
//! let bytes = codec::encode(&IncomingMessage::Add { text: "Buy milk".into() }).unwrap();
//! let decoded: IncomingMessage = codec::decode(&bytes).unwrap();
//! assert_eq!(decoded, IncomingMessage::Add { text: "Buy milk".into() });
//! ```

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{ChannelError, Result};

/// Serialize a message into a frame payload.
///
/// Failure means the message type cannot be represented on the wire, which is
/// a programming error rather than a runtime condition.
pub fn encode<T: Serialize>(message: &T) -> Result<Bytes> {
    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(|e| ChannelError::EncodingError(e.to_string()))
}

/// Deserialize a frame payload into a message.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload).map_err(|e| ChannelError::DecodingError(e.to_string()))
}
