//! Strand protocol -- wire framing, message codecs, protocol errors.
//!
//! TCP between peers. 4-byte big-endian length prefix + opaque payload.
//! The payload is produced and consumed by a [`MessageCodec`]; the framing
//! layer never interprets it.

pub mod codec;
pub mod framing;

pub use codec::{BytesCodec, JsonCodec, MessageCodec};
pub use framing::{read_frame, write_frame};

/// Length prefix size in bytes. Fixed per process and agreed out of band;
/// a prefix-width mismatch between peers is a protocol incompatibility,
/// not something negotiated on the wire.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Maximum frame payload: 16 MB. Protects against garbage prefixes.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default cap on bytes moved per buffered read.
pub const DEFAULT_RECV_BUFFER: usize = 8 * 1024;

/// Default cap on bytes moved per buffered write.
pub const DEFAULT_SEND_BUFFER: usize = 8 * 1024;

/// Well-known UDP port for discovery probes.
pub const DEFAULT_DISCOVERY_PORT: u16 = 9475;

/// Single-byte discovery probe payload.
pub const DISCOVERY_PROBE: u8 = 0x01;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The stream went dead mid-frame: a zero-byte read or write before
    /// the target length was reached. The peer is likely gone.
    #[error("transfer fault: {transferred}/{expected} bytes before the stream went dead")]
    Transfer { transferred: usize, expected: usize },
    /// EOF at a frame boundary -- the expected shutdown path, not a fault.
    #[error("stream closed")]
    Closed,
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
    #[error("codec error: {0}")]
    Codec(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
