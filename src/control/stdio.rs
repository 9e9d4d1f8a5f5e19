//! Stdout output for the operator control plane.
//!
//! # Important
//!
//! - **stdout**: link events, one JSON object per line
//! - **stderr**: logs (tracing), never parsed
//! - **Never use `println!`**: it may add `\r\n` on Windows

use std::io::Write;

use tracing::warn;

use crate::event::{EventSink, LinkEvent};

/// Write a line to stdout.
///
/// Writes the string followed by a single `\n` and flushes.
///
/// # Errors
///
/// Returns IO error if write or flush fails.
pub fn write_stdout_line(line: &str) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(line.as_bytes())?;
    handle.write_all(b"\n")?;
    handle.flush()?;
    Ok(())
}

/// Write a value to stdout as a single JSON line.
///
/// # Errors
///
/// Returns error if serialization or write fails.
pub fn write_stdout_json<T: serde::Serialize>(value: &T) -> crate::error::Result<()> {
    let json = serde_json::to_string(value)?;
    write_stdout_line(&json)?;
    Ok(())
}

/// Event sink printing every event to stdout as a JSON line.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink {
    traces: bool,
}

impl StdoutSink {
    /// Print every event except [`LinkEvent::Trace`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Also print the raw traffic in both directions.
    pub fn with_traces(mut self, traces: bool) -> Self {
        self.traces = traces;
        self
    }

    /// Whether this sink prints `event`.
    pub fn accepts(&self, event: &LinkEvent) -> bool {
        self.traces || !matches!(event, LinkEvent::Trace { .. })
    }
}

impl EventSink for StdoutSink {
    fn emit(&mut self, event: LinkEvent) {
        if !self.accepts(&event) {
            return;
        }
        if let Err(e) = write_stdout_json(&event) {
            warn!(error = %e, "Failed to write event to stdout");
        }
    }
}
