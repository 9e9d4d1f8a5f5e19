//! Events emitted by the link.
//!
//! The link never calls into a UI or logger directly. Every observable
//! happening is pushed into an [`EventSink`] as a [`LinkEvent`]; consumers
//! decide what to do with it. Events are one-way notifications.
//!
//! # Example
//!
//! ```
//! use grbl_link::event::{EventSink, LinkEvent};
//! use tokio::sync::mpsc;
//!
//! let (mut tx, mut rx) = mpsc::unbounded_channel();
//! tx.emit(LinkEvent::GrblReady);
//! assert_eq!(rx.try_recv().unwrap(), LinkEvent::GrblReady);
//! ```

use serde::Serialize;
use tokio::sync::mpsc;

/// Direction of a traced line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Received from Grbl.
    Inbound,
    /// Sent to Grbl.
    Outbound,
}

impl Direction {
    /// Trace prefix used in human-readable output.
    pub fn arrow(self) -> &'static str {
        match self {
            Direction::Inbound => "<<<",
            Direction::Outbound => ">>>",
        }
    }
}

/// A notification from the link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LinkEvent {
    /// Diagnostic message about the link itself.
    Message { text: String },
    /// Grbl printed its banner.
    Init { banner: String },
    /// Grbl is ready to receive commands (follows `Init`).
    GrblReady,
    /// A command was acknowledged.
    Ok,
    /// A command was rejected with `error:N`.
    Error { code: Option<u16>, line: String },
    /// Grbl entered an alarm state.
    Alarm {
        code: Option<u16>,
        line: String,
        description: Option<String>,
    },
    /// Real-time status report.
    Status { raw: String, state: String },
    /// Any other line from Grbl.
    Data { line: String },
    /// Every line, in both directions, for debugging.
    Trace { direction: Direction, line: String },
    /// A command was fully written to the transport.
    SendOk,
    /// Grbl stopped acknowledging; pending commands were discarded.
    Stalled { discarded: usize },
    /// The link worker has stopped.
    Terminated,
}

impl LinkEvent {
    /// Shorthand for a [`LinkEvent::Message`].
    pub fn message(text: impl Into<String>) -> Self {
        LinkEvent::Message { text: text.into() }
    }
}

/// Receiver of link events.
pub trait EventSink: Send + 'static {
    /// Deliver one event. Must not block.
    fn emit(&mut self, event: LinkEvent);
}

impl EventSink for mpsc::UnboundedSender<LinkEvent> {
    fn emit(&mut self, event: LinkEvent) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.send(event);
    }
}

impl EventSink for mpsc::Sender<LinkEvent> {
    fn emit(&mut self, event: LinkEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.try_send(event) {
            tracing::warn!(?event, "Event channel full, dropping event");
        }
    }
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: LinkEvent) {}
}

/// Sink backed by a closure.
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: FnMut(LinkEvent) + Send + 'static,
{
    fn emit(&mut self, event: LinkEvent) {
        (self.0)(event)
    }
}
