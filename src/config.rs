//! Link configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::protocol::{write_timeout_ms, DEFAULT_MAX_LINE_LEN};

/// Default serial speed of Grbl 1.1.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default bound on a single transport read.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Default time Grbl may take to acknowledge a command before the link is
/// declared stalled.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default transport read buffer size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Default capacity of the handle-to-worker request channel.
pub const DEFAULT_REQUEST_CAPACITY: usize = 64;

/// Configuration for one link.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial speed, used to compute write timeouts.
    pub baud_rate: u32,
    /// Upper bound on each transport read.
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Time without acknowledgment after which the queue is cleared.
    #[serde(with = "secs")]
    pub stall_timeout: Duration,
    /// Size of the transport read buffer.
    pub read_buffer_size: usize,
    /// Longest unterminated line accepted from Grbl.
    pub max_line_len: usize,
    /// Capacity of the request channel between handles and the worker.
    pub request_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            request_capacity: DEFAULT_REQUEST_CAPACITY,
        }
    }
}

impl LinkConfig {
    /// Create a configuration for the given serial speed.
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }

    /// Default configuration with environment overrides:
    ///
    /// - `GRBL_BAUD`
    /// - `GRBL_POLL_MS`
    /// - `GRBL_STALL_TIMEOUT_SECS`
    ///
    /// Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(baud) = env_parse::<u32>("GRBL_BAUD") {
            config.baud_rate = baud;
        }
        if let Some(ms) = env_parse::<u64>("GRBL_POLL_MS") {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("GRBL_STALL_TIMEOUT_SECS") {
            config.stall_timeout = Duration::from_secs(secs);
        }

        config
    }

    /// Set the stall timeout.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Write timeout for a payload of `len` bytes at the configured speed.
    pub fn write_timeout(&self, len: usize) -> Duration {
        Duration::from_millis(write_timeout_ms(len, self.baud_rate))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
