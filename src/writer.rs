//! Send buffer and transport flush.
//!
//! One outbound object is built into a fixed-capacity [`SendBuffer`], then
//! [`flush`] writes it out, continuing after partial writes until every byte
//! is sent or the transport fails. The buffer is cleared afterward in both
//! cases, so the next build always starts empty.
//!
//! ```text
//! Encoder ─► SendBuffer (≤ 256 bytes) ─► flush ─► transport
//!                                          │
//!                                   ActivitySignal raised/lowered
//! ```

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::activity::ActivitySignal;
use crate::error::{IotwireError, Result};

/// Capacity of the send buffer (and of one receive chunk).
pub const IO_BUFFER_SIZE: usize = 256;

/// Fixed-capacity buffer holding one outbound object's text.
///
/// Backed by a `BytesMut` allocated once; writes that would take it past
/// its capacity are refused, so it never reallocates.
#[derive(Debug)]
pub struct SendBuffer {
    buf: BytesMut,
    capacity: usize,
}

impl SendBuffer {
    /// Create a buffer of [`IO_BUFFER_SIZE`] bytes.
    pub fn new() -> Self {
        Self::with_capacity(IO_BUFFER_SIZE)
    }

    /// Create a buffer with a custom capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of buffered bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Fixed capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffered text.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Drop the buffered bytes, keeping the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Append `data` if it fits entirely.
    pub fn try_extend(&mut self, data: &[u8]) -> bool {
        if self.buf.len() + data.len() > self.capacity {
            return false;
        }
        self.buf.extend_from_slice(data);
        true
    }
}

impl Default for SendBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl io::Write for SendBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.try_extend(data) {
            Ok(data.len())
        } else {
            Err(io::Error::new(io::ErrorKind::WriteZero, "send buffer full"))
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Write the whole buffer to the transport, then clear it.
///
/// The activity signal is raised before the first write and lowered after
/// the last one, whether the transport succeeded or not. An empty buffer
/// performs no write and leaves the signal untouched.
///
/// # Errors
///
/// Returns the transport error, or `WriteZero` if the transport stops
/// accepting bytes.
pub async fn flush<W>(
    writer: &mut W,
    buffer: &mut SendBuffer,
    activity: &ActivitySignal,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let result = write_all_tracked(writer, buffer.as_bytes(), activity).await;
    buffer.clear();
    result
}

async fn write_all_tracked<W>(
    writer: &mut W,
    data: &[u8],
    activity: &ActivitySignal,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if data.is_empty() {
        return Ok(());
    }

    let _transmitting = activity.guard();
    let mut total_written = 0;

    while total_written < data.len() {
        let written = writer.write(&data[total_written..]).await?;
        if written == 0 {
            return Err(IotwireError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                "transport accepted 0 bytes",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}
