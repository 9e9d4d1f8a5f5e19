//! Classified Grbl response lines.
//!
//! Every line Grbl sends falls into exactly one [`GrblMessage`] case. The
//! checks run in a fixed order and the first match wins, so a line such as
//! `<ok>` is a status report, not an acknowledgment.
//!
//! # Example
//!
//! ```
//! use grbl_link::protocol::GrblMessage;
//!
//! let msg = GrblMessage::classify("<Idle|MPos:0,0,0>");
//! assert_eq!(msg.machine_state(), Some("Idle"));
//!
//! assert_eq!(GrblMessage::classify("ok"), GrblMessage::Ok);
//! assert_eq!(GrblMessage::classify("error:9").code(), Some(9));
//! ```

use serde::Serialize;

use super::wire_format::{
    ALARM_PREFIX, ERROR_PREFIX, INIT_PREFIX, INIT_SUFFIX, OK_LINE, STATUS_CLOSE,
    STATUS_FIELD_SEPARATOR, STATUS_OPEN,
};

/// A real-time status report (`<Idle|MPos:...|FS:...>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// The complete line, brackets included.
    pub raw: String,
    /// The machine state name (first field: `Idle`, `Run`, `Hold:0`, ...).
    pub state: String,
}

impl StatusReport {
    fn parse(line: &str) -> Self {
        let inner = &line[STATUS_OPEN.len()..line.len() - STATUS_CLOSE.len()];
        let state = inner
            .split(STATUS_FIELD_SEPARATOR)
            .next()
            .unwrap_or_default();
        Self {
            raw: line.to_string(),
            state: state.to_string(),
        }
    }

    /// The `|`-separated fields after the machine state.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        let inner = &self.raw[STATUS_OPEN.len()..self.raw.len() - STATUS_CLOSE.len()];
        inner.split(STATUS_FIELD_SEPARATOR).skip(1)
    }
}

/// One classified line received from Grbl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrblMessage {
    /// Firmware banner: Grbl (re)started and is ready for commands.
    Init { banner: String },
    /// Real-time status report.
    Status(StatusReport),
    /// Acknowledgment of the outstanding command.
    Ok,
    /// The outstanding command was rejected.
    ///
    /// `code` is `None` when the text after `error:` is not a number.
    Error { code: Option<u16>, line: String },
    /// Grbl entered an alarm state.
    Alarm { code: Option<u16>, line: String },
    /// Any other line (settings, `[MSG:...]`, `[GC:...]`, ...).
    Data(String),
}

impl GrblMessage {
    /// Classify one terminator-stripped line.
    pub fn classify(line: &str) -> Self {
        if line.starts_with(INIT_PREFIX) && line.ends_with(INIT_SUFFIX) {
            GrblMessage::Init {
                banner: line.to_string(),
            }
        } else if line.len() >= STATUS_OPEN.len() + STATUS_CLOSE.len()
            && line.starts_with(STATUS_OPEN)
            && line.ends_with(STATUS_CLOSE)
        {
            GrblMessage::Status(StatusReport::parse(line))
        } else if line == OK_LINE {
            GrblMessage::Ok
        } else if let Some(code) = line.strip_prefix(ERROR_PREFIX) {
            GrblMessage::Error {
                code: parse_code(code),
                line: line.to_string(),
            }
        } else if let Some(code) = line.strip_prefix(ALARM_PREFIX) {
            GrblMessage::Alarm {
                code: parse_code(code),
                line: line.to_string(),
            }
        } else {
            GrblMessage::Data(line.to_string())
        }
    }

    /// The numeric code of an `error:` or `ALARM:` line.
    pub fn code(&self) -> Option<u16> {
        match self {
            GrblMessage::Error { code, .. } | GrblMessage::Alarm { code, .. } => *code,
            _ => None,
        }
    }

    /// The machine state of a status report.
    pub fn machine_state(&self) -> Option<&str> {
        match self {
            GrblMessage::Status(report) => Some(&report.state),
            _ => None,
        }
    }

    /// Whether this message frees Grbl's single command slot.
    #[inline]
    pub fn releases_slot(&self) -> bool {
        matches!(self, GrblMessage::Ok | GrblMessage::Error { .. })
    }
}

fn parse_code(text: &str) -> Option<u16> {
    text.trim().parse().ok()
}
