//! Operator input: one command per stdin line.
//!
//! | Input | Effect |
//! |---|---|
//! | `!reset` | soft reset (Ctrl-X) |
//! | `!hold` | feed hold |
//! | `!resume` | cycle start / resume |
//! | `!jogcancel` | jog cancel |
//! | `!send <cmd>` | send now with the `ok` swallowed |
//! | blank, `; comment` | ignored |
//! | anything else | appended to the command queue |

use std::io::BufRead;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{GrblError, Result};
use crate::handle::LinkHandle;
use crate::protocol::RealtimeCommand;

/// One parsed operator line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorInput {
    /// Send a real-time command.
    Realtime(RealtimeCommand),
    /// Send a command immediately, swallowing its `ok`.
    Direct(String),
    /// Append to the command queue.
    Queue(String),
    /// Nothing to do.
    Skip,
}

impl OperatorInput {
    /// Parse one input line.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            return OperatorInput::Skip;
        }

        if let Some(rest) = line.strip_prefix('!') {
            let (word, arg) = match rest.split_once(char::is_whitespace) {
                Some((word, arg)) => (word, arg.trim()),
                None => (rest, ""),
            };
            match word.to_ascii_lowercase().as_str() {
                "reset" => return OperatorInput::Realtime(RealtimeCommand::SoftReset),
                "hold" => return OperatorInput::Realtime(RealtimeCommand::Hold),
                "resume" => return OperatorInput::Realtime(RealtimeCommand::Resume),
                "jogcancel" => return OperatorInput::Realtime(RealtimeCommand::JogCancel),
                "send" if !arg.is_empty() => return OperatorInput::Direct(arg.to_string()),
                _ => {}
            }
        }

        OperatorInput::Queue(line.to_string())
    }

    /// Apply this input to a running link.
    ///
    /// A rejected direct send is returned as an error; the caller decides
    /// whether it ends the session.
    pub async fn apply(self, handle: &LinkHandle) -> Result<()> {
        match self {
            OperatorInput::Realtime(command) => handle.send_realtime(command).await,
            OperatorInput::Direct(command) => handle.send(command, true).await,
            OperatorInput::Queue(command) => {
                handle.enqueue(command);
                Ok(())
            }
            OperatorInput::Skip => Ok(()),
        }
    }
}

/// Capacity of the channel between the input thread and the link.
const INPUT_CHANNEL_CAPACITY: usize = 64;

async fn apply_line(line: &str, handle: &LinkHandle) -> Result<()> {
    let parsed = OperatorInput::parse(line);
    debug!(?parsed, "Operator input");
    match parsed.apply(handle).await {
        Ok(()) => Ok(()),
        Err(GrblError::ConnectionClosed) => Err(GrblError::ConnectionClosed),
        Err(e) => {
            warn!(error = %e, line = %line, "Operator command failed");
            Ok(())
        }
    }
}

/// Read operator lines from `input` until EOF and apply each to the link.
///
/// Stops early with [`GrblError::ConnectionClosed`] once the worker is gone.
pub async fn feed_lines<R>(input: R, handle: &LinkHandle) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = AsyncBufReadExt::lines(input);
    while let Some(line) = lines.next_line().await? {
        apply_line(&line, handle).await?;
    }
    Ok(())
}

/// Read lines from a blocking reader on a dedicated thread.
///
/// Lines arrive on the returned channel, which closes at EOF or after a read
/// error (forwarded first). The thread is detached: a read that never
/// returns does not hold up runtime shutdown, and the thread ends with the
/// process.
pub fn spawn_line_reader<R>(reader: R) -> Result<mpsc::Receiver<std::io::Result<String>>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
    std::thread::Builder::new()
        .name("grbl-link-input".to_string())
        .spawn(move || {
            for line in BufRead::lines(reader) {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Read operator lines from stdin until EOF.
pub async fn feed_stdin(handle: &LinkHandle) -> Result<()> {
    let mut lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()))?;
    while let Some(line) = lines.recv().await {
        apply_line(&line?, handle).await?;
    }
    Ok(())
}
