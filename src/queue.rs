//! Command queue shared between operator-side producers and the link worker.
//!
//! The queue is the only synchronized hand-off point of the link. Producers
//! push command lines from any thread; the worker peeks at the front and only
//! pops a command once it has been handed to the transport, so a command that
//! cannot be sent yet stays queued.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// FIFO of pending command lines.
///
/// Cloning the queue yields another handle to the same storage.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    pending: Arc<Mutex<VecDeque<String>>>,
}

impl CommandQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        // A panicking producer cannot leave a VecDeque half-updated.
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a command at the back.
    pub fn push(&self, command: impl Into<String>) {
        self.lock().push_back(command.into());
    }

    /// Append several commands, keeping their order.
    pub fn extend<I, S>(&self, commands: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().extend(commands.into_iter().map(Into::into));
    }

    /// Number of pending commands.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Clone of the front command, leaving it queued.
    pub fn front(&self) -> Option<String> {
        self.lock().front().cloned()
    }

    /// Remove and return the front command.
    pub fn pop_front(&self) -> Option<String> {
        self.lock().pop_front()
    }

    /// Remove the front command if it is still `expected`.
    ///
    /// Returns `false` when a producer cleared or replaced the queue between
    /// the peek and the commit.
    pub fn commit_front(&self, expected: &str) -> bool {
        let mut pending = self.lock();
        if pending.front().map(String::as_str) == Some(expected) {
            pending.pop_front();
            true
        } else {
            false
        }
    }

    /// Remove every pending command, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut pending = self.lock();
        let discarded = pending.len();
        pending.clear();
        discarded
    }
}
