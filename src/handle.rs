//! Spawning a link worker and talking to it.
//!
//! # Architecture
//!
//! ```text
//! Operator ─┬─► CommandQueue ───────────────┐
//!           │                               ▼
//!           └─► mpsc::Sender<LinkRequest> ─► Link worker ◄──► Transport
//!                                           │
//!           watch::Receiver<LinkStatus> ◄───┤
//!           EventSink ◄─────────────────────┘
//! ```
//!
//! Queued commands are paced by Grbl's acknowledgments. Direct sends and
//! real-time commands go through the request channel and are answered with
//! the outcome of the write.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::LinkConfig;
use crate::error::{GrblError, Result};
use crate::event::EventSink;
use crate::flow::{LinkPhase, LinkStatus};
use crate::link::{Link, LinkRequest};
use crate::protocol::RealtimeCommand;
use crate::queue::CommandQueue;
use crate::transport::Transport;

/// Handle to a running link worker.
///
/// Cheaply cloneable. The worker stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    tx: mpsc::Sender<LinkRequest>,
    queue: CommandQueue,
    status: watch::Receiver<LinkStatus>,
}

impl LinkHandle {
    /// The command queue drained by the worker.
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Append a command to the queue.
    pub fn enqueue(&self, command: impl Into<String>) {
        self.queue.push(command);
    }

    /// Send a command now, bypassing the queue.
    ///
    /// Fails with [`GrblError::NotReady`] while Grbl has not acknowledged the
    /// previous command. With `suppress_ack` the matching `ok` is swallowed.
    pub async fn send(&self, command: impl Into<String>, suppress_ack: bool) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.request(LinkRequest::Send {
            command: command.into(),
            suppress_ack,
            reply,
        })
        .await?;
        response.await.map_err(|_| GrblError::ConnectionClosed)?
    }

    /// Send a real-time command.
    pub async fn send_realtime(&self, command: RealtimeCommand) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.request(LinkRequest::Realtime { command, reply })
            .await?;
        response.await.map_err(|_| GrblError::ConnectionClosed)?
    }

    /// Send a soft reset (Ctrl-X).
    pub async fn soft_reset(&self) -> Result<()> {
        self.send_realtime(RealtimeCommand::SoftReset).await
    }

    /// Latest published flow-control status.
    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    /// Wait until the link reaches `phase`.
    ///
    /// Returns [`GrblError::ConnectionClosed`] if the worker stops first.
    pub async fn wait_for_phase(&self, phase: LinkPhase) -> Result<LinkStatus> {
        let mut status = self.status.clone();
        let reached = status
            .wait_for(|s| s.phase == phase)
            .await
            .map_err(|_| GrblError::ConnectionClosed)?;
        Ok(reached.clone())
    }

    /// Ask the worker to stop. Pending queued commands are abandoned.
    ///
    /// Succeeds if the worker has already stopped.
    pub async fn abort(&self) -> Result<()> {
        // A closed channel means the worker is gone already.
        let _ = self.tx.send(LinkRequest::Abort).await;
        Ok(())
    }

    /// Check if the worker has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request(&self, request: LinkRequest) -> Result<()> {
        self.tx
            .send(request)
            .await
            .map_err(|_| GrblError::ConnectionClosed)
    }
}

/// Spawn a link worker over an opened transport.
///
/// # Returns
///
/// A tuple of `(LinkHandle, JoinHandle)`. The join handle resolves when the
/// worker stops, with the error that stopped it if any.
pub fn spawn_link<T, S>(
    transport: T,
    config: LinkConfig,
    sink: S,
) -> (LinkHandle, JoinHandle<Result<()>>)
where
    T: Transport,
    S: EventSink,
{
    let queue = CommandQueue::new();
    let (tx, rx) = mpsc::channel(config.request_capacity.max(1));
    let (status_tx, status_rx) = watch::channel(LinkStatus::default());

    let link = Link::new(transport, queue.clone(), sink, config);
    let task = tokio::spawn(link.run(rx, status_tx));

    let handle = LinkHandle {
        tx,
        queue,
        status: status_rx,
    };
    (handle, task)
}
