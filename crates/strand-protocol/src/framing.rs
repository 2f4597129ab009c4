//! Length-prefixed framing over a shared TCP stream.
//!
//! Wire format: 4-byte big-endian length prefix + payload. All I/O goes
//! through the stream's readiness API so one `Arc<TcpStream>` can be
//! shared between a receive loop, keep-alive probes, and senders.
//!
//! Each frame is fully read or the operation fails; there is no support
//! for resuming a half-read frame after an error.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::Interest;
use tokio::net::TcpStream;

use crate::{ProtocolError, LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE};

/// Write one frame: the length prefix, then the payload in chunks of at
/// most `send_buffer` bytes.
pub async fn write_frame(
    stream: &TcpStream,
    payload: &[u8],
    send_buffer: usize,
) -> Result<(), ProtocolError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let prefix = (payload.len() as u32).to_be_bytes();
    write_all(stream, &prefix, send_buffer).await?;
    write_all(stream, payload, send_buffer).await?;

    tracing::trace!(len = payload.len(), "frame written");
    Ok(())
}

/// Read one frame and return its payload.
///
/// Returns [`ProtocolError::Closed`] on EOF at a frame boundary (before
/// the first prefix byte) and [`ProtocolError::Transfer`] on EOF anywhere
/// inside a frame.
pub async fn read_frame(stream: &TcpStream, recv_buffer: usize) -> Result<Bytes, ProtocolError> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    match read_exact(stream, &mut prefix, recv_buffer).await {
        Ok(()) => {}
        Err(ProtocolError::Transfer { transferred: 0, .. }) => return Err(ProtocolError::Closed),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut payload = BytesMut::zeroed(len);
    read_exact(stream, &mut payload, recv_buffer).await?;

    tracing::trace!(len, "frame read");
    Ok(payload.freeze())
}

/// Fill `buf` from the stream, at most `cap` bytes per read.
async fn read_exact(stream: &TcpStream, buf: &mut [u8], cap: usize) -> Result<(), ProtocolError> {
    let cap = cap.max(1);
    let expected = buf.len();
    let mut filled = 0;
    while filled < expected {
        stream.ready(Interest::READABLE).await?;
        let end = expected.min(filled + cap);
        match stream.try_read(&mut buf[filled..end]) {
            Ok(0) => {
                return Err(ProtocolError::Transfer {
                    transferred: filled,
                    expected,
                })
            }
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Drain `buf` into the stream, at most `cap` bytes per write.
async fn write_all(stream: &TcpStream, buf: &[u8], cap: usize) -> Result<(), ProtocolError> {
    let cap = cap.max(1);
    let expected = buf.len();
    let mut written = 0;
    while written < expected {
        stream.ready(Interest::WRITABLE).await?;
        let end = expected.min(written + cap);
        match stream.try_write(&buf[written..end]) {
            Ok(0) => {
                return Err(ProtocolError::Transfer {
                    transferred: written,
                    expected,
                })
            }
            Ok(n) => written += n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
