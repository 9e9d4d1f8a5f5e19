//! Error types for grbl-link.

use thiserror::Error;

/// Main error type for all link operations.
///
/// Firmware-reported `error:N` and `ALARM:N` lines are not errors at this
/// level; they are surfaced as [`LinkEvent`](crate::event::LinkEvent)s.
#[derive(Debug, Error)]
pub enum GrblError {
    /// The transport could not be opened. Fatal to the link.
    #[error("Failed to open transport: {0}")]
    TransportOpen(String),

    /// I/O error while reading from or writing to the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Incoming bytes were not valid UTF-8. The line buffer was discarded.
    #[error("Decode error: {0}")]
    Decode(#[from] std::str::Utf8Error),

    /// Framing violation (unterminated line over the length limit).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A normal command was sent while Grbl still owes an acknowledgment.
    #[error("Grbl not ready to receive data")]
    NotReady,

    /// The transport did not accept the bytes within the computed timeout.
    #[error("Write timed out after {timeout_ms} ms")]
    WriteTimeout {
        /// The timeout that was exceeded.
        timeout_ms: u64,
    },

    /// Grbl stopped acknowledging; the command queue was cleared.
    #[error("Link stalled, {discarded} queued command(s) discarded")]
    Stalled {
        /// Number of commands removed from the queue.
        discarded: usize,
    },

    /// The link worker is gone or the transport reached EOF.
    #[error("Connection closed")]
    ConnectionClosed,

    /// JSON serialization error (control plane only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GrblError {
    /// Whether the link keeps running after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GrblError::Decode(_)
                | GrblError::Protocol(_)
                | GrblError::NotReady
                | GrblError::WriteTimeout { .. }
                | GrblError::Stalled { .. }
        )
    }
}

/// Result type alias using GrblError.
pub type Result<T> = std::result::Result<T, GrblError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(GrblError::NotReady.is_recoverable());
        assert!(GrblError::WriteTimeout { timeout_ms: 12 }.is_recoverable());
        assert!(GrblError::Protocol("too long".into()).is_recoverable());
        assert!(!GrblError::ConnectionClosed.is_recoverable());
        assert!(!GrblError::TransportOpen("/dev/ttyUSB0".into()).is_recoverable());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            GrblError::WriteTimeout { timeout_ms: 14 }.to_string(),
            "Write timed out after 14 ms"
        );
        assert_eq!(
            GrblError::Stalled { discarded: 3 }.to_string(),
            "Link stalled, 3 queued command(s) discarded"
        );
    }
}
