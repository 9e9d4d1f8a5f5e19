//! Operator control plane: stdin lines in, JSON event lines out.
//!
//! # Workflow
//!
//! 1. The binary spawns a link over a serial port
//! 2. Each stdin line is parsed into an [`OperatorInput`] and applied
//! 3. Every [`LinkEvent`](crate::event::LinkEvent) is printed to stdout as JSON
//! 4. Logs go to stderr
//!
//! # Example
//!
//! ```ignore
//! use grbl_link::control::{feed_stdin, StdoutSink};
//! use grbl_link::{spawn_link, LinkConfig};
//!
//! let (handle, task) = spawn_link(port, LinkConfig::default(), StdoutSink::new());
//! feed_stdin(&handle).await?;
//! ```

mod operator;
mod stdio;

pub use operator::{feed_lines, feed_stdin, OperatorInput};
pub use stdio::{write_stdout_json, write_stdout_line, StdoutSink};
