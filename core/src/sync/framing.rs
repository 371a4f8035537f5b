//! Length-prefixed message framing for TCP transport
//!
//! Each message is prefixed with a 4-byte big-endian length, followed by
//! the JSON payload. Reading exact lengths makes the stream safe against
//! split and coalesced TCP segments.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::constants::MAX_MESSAGE_SIZE;
use crate::protocol::Message;
use crate::{Error, Result};

/// Read one length-prefixed frame.
///
/// An oversized length is reported as a transport error: the frame
/// boundary can no longer be trusted, so the stream must be dropped.
pub async fn read_framed_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await
        .map_err(|e| Error::Transport(e.to_string()))?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(Error::Transport(format!(
            "incoming frame too large: {} bytes (max {})",
            len, MAX_MESSAGE_SIZE
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await
        .map_err(|e| Error::Transport(e.to_string()))?;

    Ok(payload)
}

/// Write one length-prefixed frame and flush it.
///
/// Oversized payloads are refused before anything touches the stream.
pub async fn write_framed_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<()> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(Error::Protocol(format!(
            "message too large: {} bytes (max {})",
            payload.len(), MAX_MESSAGE_SIZE
        )));
    }

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);

    writer.write_all(&frame).await
        .map_err(|e| Error::Transport(e.to_string()))?;
    writer.flush().await
        .map_err(|e| Error::Transport(e.to_string()))?;

    Ok(())
}

/// Read and decode the next message. A frame that fails to decode yields
/// `Error::Protocol` with the stream still positioned at the next frame.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message> {
    let payload = read_framed_message(reader).await?;
    Message::decode(&payload)
}

/// Encode and write a message as a single frame
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &Message) -> Result<()> {
    let payload = message.encode()?;
    write_framed_message(writer, &payload).await
}
