//! # grbl-link
//!
//! Link-layer driver for the Grbl CNC controller firmware.
//!
//! This crate sits between an operator (or a G-code sender) and a Grbl
//! controller on a byte stream. It:
//!
//! - frames the inbound byte stream into lines
//! - classifies each line (banner, status report, `ok`, `error:N`,
//!   `ALARM:N`, other data)
//! - keeps a single outstanding command in flight, so Grbl's input buffer is
//!   never overrun
//! - drains a command queue under that flow control and clears it when Grbl
//!   stops acknowledging
//!
//! ## Architecture
//!
//! - **Link worker** (`link`): one task owns the transport and flow-control
//!   state, so nothing in the hot path is locked
//! - **Command queue** (`queue`): the only shared structure, fed by producers
//!   on any thread
//! - **Events** (`event`): everything observable is pushed into an
//!   [`EventSink`]
//!
//! ## Example
//!
//! ```ignore
//! use grbl_link::{spawn_link, LinkConfig, LinkEvent};
//! use grbl_link::transport::open_serial;
//!
//! #[tokio::main]
//! async fn main() -> grbl_link::Result<()> {
//!     let port = open_serial("/dev/ttyUSB0", 115_200)?;
//!     let (events, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!     let (handle, task) = spawn_link(port, LinkConfig::default(), events);
//!
//!     handle.queue().extend(["G21", "G90", "G0 X10 Y10"]);
//!
//!     while let Some(event) = rx.recv().await {
//!         if event == LinkEvent::Terminated {
//!             break;
//!         }
//!         println!("{:?}", event);
//!     }
//!     task.await.ok();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod event;
pub mod flow;
pub mod protocol;
pub mod queue;
pub mod transport;

mod handle;
mod link;

pub use config::LinkConfig;
pub use error::{GrblError, Result};
pub use event::{Direction, EventSink, FnSink, LinkEvent, NullSink};
pub use flow::{FlowControl, LinkPhase, LinkStatus};
pub use handle::{spawn_link, LinkHandle};
pub use link::{Link, LinkRequest};
pub use protocol::{GrblMessage, LineBuffer, RealtimeCommand};
pub use queue::CommandQueue;
