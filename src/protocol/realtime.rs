//! Single-byte real-time commands.
//!
//! Grbl handles these bytes as soon as they arrive, outside its line buffer,
//! so they are never terminated, never acknowledged with `ok`, and may be sent
//! while a line-buffered command is still outstanding.

use serde::{Deserialize, Serialize};

/// The real-time commands this link sends out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealtimeCommand {
    /// Soft reset (Ctrl-X). Grbl reboots and prints its banner again.
    SoftReset,
    /// Hold.
    Hold,
    /// Start / resume.
    Resume,
    /// Cancel the active jog motion.
    JogCancel,
}

impl RealtimeCommand {
    /// All real-time commands.
    pub const ALL: [RealtimeCommand; 4] = [
        RealtimeCommand::SoftReset,
        RealtimeCommand::Hold,
        RealtimeCommand::Resume,
        RealtimeCommand::JogCancel,
    ];

    /// The byte written to the wire.
    #[inline]
    pub fn byte(self) -> u8 {
        match self {
            RealtimeCommand::SoftReset => 0x18,
            RealtimeCommand::Hold => 0xA0,
            RealtimeCommand::Resume => 0xA1,
            RealtimeCommand::JogCancel => 0x85,
        }
    }

    /// Look up the command for a wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|cmd| cmd.byte() == byte)
    }

    /// Recognise a command string made of exactly one real-time character.
    ///
    /// The characters are the code points equal to the wire bytes
    /// (`'\u{18}'`, `'\u{a0}'`, `'\u{a1}'`, `'\u{85}'`).
    pub fn from_command(command: &str) -> Option<Self> {
        let mut chars = command.chars();
        let c = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        u8::try_from(u32::from(c)).ok().and_then(Self::from_byte)
    }

    /// The command as a one-character string.
    pub fn as_char(self) -> char {
        char::from(self.byte())
    }
}
