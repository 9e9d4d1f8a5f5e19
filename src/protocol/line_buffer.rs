//! Line buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management. Grbl terminates every
//! response with `\r\n`; a serial read can end anywhere inside a line, so the
//! unterminated tail of each read is carried over to the next one.
//!
//! Only complete lines are decoded as UTF-8, one line at a time. A multi-byte
//! character split across two reads is therefore never a decode error, a
//! corrupted line never takes its neighbours down with it, and the lines
//! produced do not depend on where the transport happened to split the
//! stream.
//!
//! # Example
//!
//! ```
//! use grbl_link::protocol::LineBuffer;
//!
//! let mut buffer = LineBuffer::new();
//!
//! assert!(buffer.push(b"<Idle|MPos:0.000,0").lines.is_empty());
//! let framed = buffer.push(b".000,0.000>\r\nok\r\n");
//!
//! assert_eq!(framed.lines, vec!["<Idle|MPos:0.000,0.000,0.000>", "ok"]);
//! assert!(framed.errors.is_empty());
//! ```

use bytes::BytesMut;

use crate::error::GrblError;

/// Default limit for an unterminated line held in the carry-over.
pub const DEFAULT_MAX_LINE_LEN: usize = 1024;

/// Outcome of one [`LineBuffer::push`].
#[derive(Debug, Default)]
pub struct FramedLines {
    /// Complete lines, in stream order, without their terminators.
    pub lines: Vec<String>,
    /// Lines that were dropped: [`GrblError::Decode`] for a line that is not
    /// valid UTF-8, [`GrblError::Protocol`] for an oversize fragment.
    pub errors: Vec<GrblError>,
}

impl FramedLines {
    /// Check if nothing was dropped.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Buffer for accumulating incoming bytes and extracting complete lines.
pub struct LineBuffer {
    /// Carry-over: bytes after the last line terminator seen so far.
    buffer: BytesMut,
    /// Maximum length of the carry-over before it is treated as garbage.
    max_line_len: usize,
    /// Set after an oversize fragment: input is dropped up to the next `\n`.
    skipping: bool,
}

impl LineBuffer {
    /// Create a new line buffer with the default line length limit.
    pub fn new() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }

    /// Create a new line buffer with a custom line length limit.
    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_line_len.min(64 * 1024)),
            max_line_len,
            skipping: false,
        }
    }

    /// Push data into the buffer and extract all complete lines.
    ///
    /// Lines are returned without their terminator (`\n` or `\r\n`). Empty
    /// lines are returned as empty strings. If the data ends mid-line, the
    /// fragment is kept for the next push.
    ///
    /// Complete lines are always returned. A line that is not valid UTF-8 is
    /// dropped on its own. An unterminated fragment longer than the line
    /// length limit is dropped together with the rest of that line, up to
    /// its terminator in a later push. Each drop is reported in
    /// [`FramedLines::errors`].
    pub fn push(&mut self, data: &[u8]) -> FramedLines {
        let mut framed = FramedLines::default();

        let data = if self.skipping {
            match data.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.skipping = false;
                    &data[pos + 1..]
                }
                None => return framed,
            }
        } else {
            data
        };
        self.buffer.extend_from_slice(data);

        let complete = self
            .buffer
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |pos| pos + 1);

        if complete > 0 {
            let region = self.buffer.split_to(complete);
            for raw in region[..complete - 1].split(|&b| b == b'\n') {
                let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
                match std::str::from_utf8(raw) {
                    Ok(line) => framed.lines.push(line.to_string()),
                    Err(e) => framed.errors.push(GrblError::Decode(e)),
                }
            }
        }

        let fragment_len = self.buffer.len();
        if fragment_len > self.max_line_len {
            self.buffer.clear();
            self.skipping = true;
            framed.errors.push(GrblError::Protocol(format!(
                "Unterminated line of {} bytes exceeds maximum {}",
                fragment_len, self.max_line_len
            )));
        }

        framed
    }

    /// Get the number of buffered (carry-over) bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard any buffered fragment.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.skipping = false;
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
