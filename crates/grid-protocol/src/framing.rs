//! Length-prefixed message framing.
//!
//! Raw stream sockets do not guarantee one message per read, so every JSON
//! payload travels behind a `u32` big-endian length prefix. A zero-length
//! frame is skipped (keepalive); anything above [`MAX_FRAME_LEN`] is
//! rejected before allocation.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on one frame. A full sync snapshot of a busy registry fits
/// comfortably below this.
pub const MAX_FRAME_LEN: usize = 1 << 20;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    Oversized(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("frame payload is not valid JSON for the expected type: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize `msg` and prepend its length prefix.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, FrameError> {
    let payload = serde_json::to_vec(msg)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::Oversized(payload.len()));
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Read one frame payload. `Ok(None)` on clean EOF at a frame boundary.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let frame_len = u32::from_be_bytes(len_buf) as usize;
        if frame_len == 0 {
            continue;
        }
        if frame_len > MAX_FRAME_LEN {
            return Err(FrameError::Oversized(frame_len));
        }

        let mut payload = vec![0u8; frame_len];
        reader.read_exact(&mut payload).await?;
        return Ok(Some(payload));
    }
}

/// Write one message as a single frame.
pub async fn write_message<W, T>(writer: &mut W, msg: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame and decode it. `Ok(None)` on clean EOF.
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame(reader).await? {
        None => Ok(None),
        Some(payload) => Ok(Some(serde_json::from_slice(&payload)?)),
    }
}
