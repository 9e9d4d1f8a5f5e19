//! Literal wire formats of the Grbl serial protocol.
//!
//! ```text
//! banner   Grbl 1.1f ['$' for help]
//! status   <Idle|MPos:0.000,0.000,0.000|FS:0,0>
//! ack      ok
//! error    error:9
//! alarm    ALARM:1
//! ```
//!
//! Every response line ends with `\r\n`. Commands sent to Grbl end with `\n`,
//! except the single-byte real-time commands which are never terminated.

/// Banner prefix announcing a (re)started firmware.
pub const INIT_PREFIX: &str = "Grbl ";

/// Banner suffix (`['$' for help]`).
pub const INIT_SUFFIX: &str = "help]";

/// Opening delimiter of a real-time status report.
pub const STATUS_OPEN: &str = "<";

/// Closing delimiter of a real-time status report.
pub const STATUS_CLOSE: &str = ">";

/// Field separator inside a status report.
pub const STATUS_FIELD_SEPARATOR: char = '|';

/// Acknowledgment line.
pub const OK_LINE: &str = "ok";

/// Prefix of a rejected-command response.
pub const ERROR_PREFIX: &str = "error:";

/// Prefix of an alarm notification.
pub const ALARM_PREFIX: &str = "ALARM:";

/// Terminator appended to every line-buffered command.
pub const LINE_TERMINATOR: char = '\n';

/// Append the line terminator unless the command already ends with it.
pub fn terminate_line(command: &str) -> String {
    if command.ends_with(LINE_TERMINATOR) {
        command.to_string()
    } else {
        let mut line = String::with_capacity(command.len() + 1);
        line.push_str(command);
        line.push(LINE_TERMINATOR);
        line
    }
}

/// Render an outbound command for the debug trace, with its terminator
/// spelled out (`G0 X1\n` becomes `G0 X1\\n`).
pub fn render_outbound(command: &str) -> String {
    if let Some(body) = command.strip_suffix("\r\n") {
        format!("{}\\r\\n", body)
    } else if let Some(body) = command.strip_suffix('\n') {
        format!("{}\\n", body)
    } else {
        command
            .chars()
            .map(|c| {
                if c.is_control() || !c.is_ascii() {
                    format!("0x{:02X}", c as u32)
                } else {
                    c.to_string()
                }
            })
            .collect()
    }
}

/// Milliseconds allowed to write `len` bytes at `baud_rate`:
/// twice the theoretical transmission time, plus 10 ms.
///
/// The transmission time is rounded up to the next whole millisecond.
pub fn write_timeout_ms(len: usize, baud_rate: u32) -> u64 {
    let baud = u64::from(baud_rate.max(1));
    let bits = 1000 * len as u64 * 8;
    let needed = bits.div_ceil(baud);
    10 + 2 * needed
}
