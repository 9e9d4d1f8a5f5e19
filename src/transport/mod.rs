//! Transport module - the byte stream to Grbl.
//!
//! Any `AsyncRead + AsyncWrite` stream can carry the link: a serial port in
//! production, `tokio::io::duplex` in tests. This module provides:
//! - [`Transport`], the bound the link places on its stream
//! - bounded read and write helpers
//! - `open_serial` (feature `serial`): an 8N1 serial port via `tokio-serial`

#[cfg(feature = "serial")]
mod serial;

#[cfg(feature = "serial")]
pub use serial::{available_ports, open_serial};

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{GrblError, Result};

/// A byte stream the link can run over.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Read whatever is available, waiting at most `timeout`.
///
/// Returns `Ok(None)` if nothing arrived in time and `Ok(Some(0))` at EOF.
pub async fn read_available<R>(reader: &mut R, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>>
where
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(timeout, reader.read(buf)).await {
        Ok(Ok(n)) => Ok(Some(n)),
        Ok(Err(e)) => Err(GrblError::Io(e)),
        Err(_elapsed) => Ok(None),
    }
}

/// Write and flush `bytes`, failing with [`GrblError::WriteTimeout`] if the
/// transport does not take them within `timeout`.
pub async fn write_with_timeout<W>(writer: &mut W, bytes: &[u8], timeout: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let write = async {
        writer.write_all(bytes).await?;
        writer.flush().await
    };

    match tokio::time::timeout(timeout, write).await {
        Ok(result) => result.map_err(GrblError::Io),
        Err(_elapsed) => Err(GrblError::WriteTimeout {
            timeout_ms: duration_ms(timeout),
        }),
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
