//! Length-prefixed message framing
//!
//! Every message on a client stream is `[u32 little-endian length][payload]`.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {0} bytes (max {1})")]
    MessageTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Read one framed message, rejecting payloads above `max_len`
pub async fn read_message<R: AsyncRead + Unpin>(
    stream: &mut R,
    max_len: usize,
) -> Result<Vec<u8>, FramingError> {
    let mut len_buf = [0u8; 4];
    read_exact_or_closed(stream, &mut len_buf).await?;

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > max_len {
        return Err(FramingError::MessageTooLarge(len, max_len));
    }
    if len == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![0u8; len];
    read_exact_or_closed(stream, &mut buf).await?;
    Ok(buf)
}

async fn read_exact_or_closed<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut [u8],
) -> Result<(), FramingError> {
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(FramingError::ConnectionClosed),
        Err(e) => Err(FramingError::Io(e)),
    }
}

/// Write one framed message and flush
pub async fn write_message<W: AsyncWrite + Unpin>(
    stream: &mut W,
    data: &[u8],
    max_len: usize,
) -> Result<(), FramingError> {
    if data.len() > max_len || data.len() > u32::MAX as usize {
        return Err(FramingError::MessageTooLarge(data.len(), max_len));
    }

    stream.write_all(&(data.len() as u32).to_le_bytes()).await?;
    stream.write_all(data).await?;
    stream.flush().await?;
    Ok(())
}
