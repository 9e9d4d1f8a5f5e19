//! Protocol module - line framing, response grammar, and real-time bytes.
//!
//! This module implements the Grbl serial protocol:
//! - Line buffer for accumulating partial reads
//! - Classification of response lines
//! - Single-byte real-time commands
//! - Alarm code descriptions

mod alarm;
mod line_buffer;
mod message;
mod realtime;
mod wire_format;

pub use alarm::{alarm_info, AlarmInfo};
pub use line_buffer::{FramedLines, LineBuffer, DEFAULT_MAX_LINE_LEN};
pub use message::{GrblMessage, StatusReport};
pub use realtime::RealtimeCommand;
pub use wire_format::{
    render_outbound, terminate_line, write_timeout_ms, ALARM_PREFIX, ERROR_PREFIX, INIT_PREFIX,
    INIT_SUFFIX, LINE_TERMINATOR, OK_LINE, STATUS_CLOSE, STATUS_FIELD_SEPARATOR, STATUS_OPEN,
};
