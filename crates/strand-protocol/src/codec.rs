//! Message codecs -- serialize application values to frame payloads.
//!
//! The transport core never inspects payload bytes; everything typed goes
//! through a [`MessageCodec`]. [`JsonCodec`] is the default. [`BytesCodec`]
//! passes raw binary payloads through untouched (blob transfer).

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ProtocolError;

/// Converts a typed message to and from an opaque frame payload.
///
/// Implementations must be deterministic and symmetric: a round trip
/// preserves the value.
pub trait MessageCodec<M>: Send + Sync + 'static {
    fn encode(&self, message: &M) -> Result<Vec<u8>, ProtocolError>;
    fn decode(&self, payload: &[u8]) -> Result<M, ProtocolError>;
}

/// serde JSON codec, the default for typed messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<M> MessageCodec<M> for JsonCodec
where
    M: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn encode(&self, message: &M) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(message)?)
    }

    fn decode(&self, payload: &[u8]) -> Result<M, ProtocolError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Identity codec for `Vec<u8>` messages: the payload is the message.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl MessageCodec<Vec<u8>> for BytesCodec {
    fn encode(&self, message: &Vec<u8>) -> Result<Vec<u8>, ProtocolError> {
        Ok(message.clone())
    }

    fn decode(&self, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        Ok(payload.to_vec())
    }
}
