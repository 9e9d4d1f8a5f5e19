//! The link worker: framing, classification, sending, and queue draining.
//!
//! A [`Link`] owns the transport, the line buffer, and the flow-control
//! state. One cooperative loop ([`Link::run`]) interleaves:
//! 1. requests from [`LinkHandle`](crate::handle::LinkHandle)s (including abort)
//! 2. a bounded read from the transport, fed through framer and classifier
//! 3. one step of the queue drainer
//!
//! Because both directions run on the same task, every flow-control update is
//! totally ordered without locks.
//!
//! The individual steps are public so a link can also be driven by hand:
//!
//! ```ignore
//! let mut link = Link::new(port, CommandQueue::new(), tx, LinkConfig::default());
//! link.poll_transport().await?;      // reads the banner
//! link.send("$$", true).await?;      // side-channel command, ok swallowed
//! link.drain_queue().await?;
//! ```

use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::LinkConfig;
use crate::error::{GrblError, Result};
use crate::event::{Direction, EventSink, LinkEvent};
use crate::flow::{DrainAction, FlowControl, LinkStatus};
use crate::protocol::{
    alarm_info, render_outbound, terminate_line, GrblMessage, LineBuffer, RealtimeCommand,
};
use crate::queue::CommandQueue;
use crate::transport::{read_available, write_with_timeout, Transport};

/// A request from a handle to the worker.
#[derive(Debug)]
pub enum LinkRequest {
    /// Send a line-buffered command.
    Send {
        command: String,
        suppress_ack: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Send a real-time command.
    Realtime {
        command: RealtimeCommand,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Stop the worker.
    Abort,
}

/// One Grbl link.
pub struct Link<T, S> {
    transport: T,
    lines: LineBuffer,
    flow: FlowControl,
    queue: CommandQueue,
    sink: S,
    config: LinkConfig,
    read_buf: Vec<u8>,
}

impl<T, S> Link<T, S>
where
    T: Transport,
    S: EventSink,
{
    /// Create a link over an opened transport.
    pub fn new(transport: T, queue: CommandQueue, sink: S, config: LinkConfig) -> Self {
        Self {
            transport,
            lines: LineBuffer::with_max_line_len(config.max_line_len),
            flow: FlowControl::new(),
            queue,
            sink,
            read_buf: vec![0u8; config.read_buffer_size.max(1)],
            config,
        }
    }

    /// The flow-control state.
    pub fn flow(&self) -> &FlowControl {
        &self.flow
    }

    /// The command queue this link drains.
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Snapshot of the flow-control state.
    pub fn status(&self) -> LinkStatus {
        self.flow.status()
    }

    fn emit(&mut self, event: LinkEvent) {
        self.sink.emit(event);
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    /// Read once from the transport (bounded by the poll interval) and
    /// process every complete line.
    ///
    /// Returns [`GrblError::ConnectionClosed`] at EOF. Decode and framing
    /// errors are reported as events and do not fail the call.
    pub async fn poll_transport(&mut self) -> Result<()> {
        let n = match read_available(
            &mut self.transport,
            &mut self.read_buf,
            self.config.poll_interval,
        )
        .await?
        {
            None => return Ok(()),
            Some(0) => return Err(GrblError::ConnectionClosed),
            Some(n) => n,
        };

        let chunk = self.read_buf[..n].to_vec();
        self.feed(&chunk);
        Ok(())
    }

    /// Feed raw bytes through the line buffer and handle every complete line.
    ///
    /// Lines the framer had to drop are reported after the lines it kept.
    pub fn feed(&mut self, chunk: &[u8]) {
        let framed = self.lines.push(chunk);
        for line in framed.lines {
            self.handle_line(&line);
        }
        for e in framed.errors {
            warn!(error = %e, "Dropped inbound line");
            self.emit(LinkEvent::message(format!("Receive error: {}", e)));
        }
    }

    /// Classify one line, apply its flow-control effect, and emit its events.
    pub fn handle_line(&mut self, line: &str) -> GrblMessage {
        debug!("<<< {}", line);
        self.emit(LinkEvent::Trace {
            direction: Direction::Inbound,
            line: line.to_string(),
        });

        let message = GrblMessage::classify(line);
        match &message {
            GrblMessage::Init { banner } => {
                self.flow.on_init();
                info!(banner = %banner, "Grbl ready to receive data");
                self.emit(LinkEvent::message("Grbl ready to receive data"));
                self.emit(LinkEvent::Init {
                    banner: banner.clone(),
                });
                self.emit(LinkEvent::GrblReady);
            }
            GrblMessage::Status(report) => {
                self.flow.on_status(&report.state);
                self.emit(LinkEvent::Status {
                    raw: report.raw.clone(),
                    state: report.state.clone(),
                });
            }
            GrblMessage::Ok => {
                if self.flow.on_ok() {
                    self.emit(LinkEvent::Ok);
                } else {
                    debug!(
                        remaining = self.flow.suppressed_oks(),
                        "Suppressed ok consumed"
                    );
                }
            }
            GrblMessage::Error { code, line } => {
                self.flow.on_error();
                warn!(code = ?code, "Grbl rejected command");
                self.emit(LinkEvent::Error {
                    code: *code,
                    line: line.clone(),
                });
            }
            GrblMessage::Alarm { code, line } => {
                let description = code
                    .and_then(alarm_info)
                    .map(|info| format!("{}: {}", info.title, info.description));
                warn!(code = ?code, "Grbl alarm");
                self.emit(LinkEvent::Alarm {
                    code: *code,
                    line: line.clone(),
                    description,
                });
            }
            GrblMessage::Data(line) => {
                self.emit(LinkEvent::Data { line: line.clone() });
            }
        }
        message
    }

    // ------------------------------------------------------------------
    // Write side
    // ------------------------------------------------------------------

    /// Send a command.
    ///
    /// A command consisting of exactly one real-time character is sent as a
    /// real-time byte. Any other command needs a free slot, otherwise
    /// [`GrblError::NotReady`] is returned without touching the transport.
    ///
    /// With `suppress_ack`, the `ok` answering this command is consumed
    /// silently.
    pub async fn send(&mut self, command: &str, suppress_ack: bool) -> Result<()> {
        if let Some(realtime) = RealtimeCommand::from_command(command) {
            return self.send_realtime(realtime).await;
        }

        if let Err(e) = self.flow.check_send(false) {
            warn!(command = %command.trim_end(), "Send rejected, Grbl not ready");
            self.emit(LinkEvent::message(format!(
                "Error: Grbl not ready to receive data ({})",
                command.trim_end()
            )));
            return Err(e);
        }

        let line = terminate_line(command);
        if suppress_ack {
            self.flow.suppress_next_ok();
        }

        match self.transmit(&line).await {
            Ok(()) => {
                self.flow.on_line_sent(Instant::now());
                Ok(())
            }
            Err(e) => {
                if suppress_ack {
                    self.flow.cancel_suppression();
                }
                Err(e)
            }
        }
    }

    /// Send a real-time command. Never blocked by, and never changes, the
    /// send window.
    pub async fn send_realtime(&mut self, command: RealtimeCommand) -> Result<()> {
        let mut encoded = [0u8; 4];
        let text: &str = command.as_char().encode_utf8(&mut encoded);
        debug!(?command, "Sending real-time command");
        self.transmit_bytes(&[command.byte()], text).await?;

        if command == RealtimeCommand::SoftReset {
            self.flow.on_soft_reset();
        }
        Ok(())
    }

    async fn transmit(&mut self, line: &str) -> Result<()> {
        self.transmit_bytes(line.as_bytes(), line).await
    }

    async fn transmit_bytes(&mut self, bytes: &[u8], text: &str) -> Result<()> {
        let rendered = render_outbound(text);
        debug!(">>> {}", rendered);
        self.emit(LinkEvent::Trace {
            direction: Direction::Outbound,
            line: rendered,
        });

        let timeout = self.config.write_timeout(bytes.len());
        match write_with_timeout(&mut self.transport, bytes, timeout).await {
            Ok(()) => {
                self.emit(LinkEvent::SendOk);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Error sending data");
                self.emit(LinkEvent::message(format!("Error sending data: {}", e)));
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Queue drainer
    // ------------------------------------------------------------------

    /// Run one step of the queue drainer.
    ///
    /// - empty queue: nothing happens
    /// - slot free: the front command is sent, then removed from the queue
    ///   (also when the write fails; it is never requeued)
    /// - waiting for an acknowledgment past the stall timeout: the queue is
    ///   cleared, a [`LinkEvent::Stalled`] is emitted once, and
    ///   [`GrblError::Stalled`] is returned
    /// - otherwise the queue is left untouched
    pub async fn drain_queue(&mut self) -> Result<()> {
        if self.queue.is_empty() {
            return Ok(());
        }

        match self
            .flow
            .drain_action(Instant::now(), self.config.stall_timeout)
        {
            DrainAction::Wait => Ok(()),
            DrainAction::Stall => {
                let discarded = self.queue.clear();
                self.flow.on_stall();
                warn!(discarded, "Grbl did not acknowledge in time, queue cleared");
                self.emit(LinkEvent::message(format!(
                    "Timeout waiting for Grbl, {} queued command(s) discarded. \
                     Send a soft reset (Ctrl-X) to reinitialize Grbl",
                    discarded
                )));
                self.emit(LinkEvent::Stalled { discarded });
                Err(GrblError::Stalled { discarded })
            }
            DrainAction::Send => {
                let Some(command) = self.queue.front() else {
                    return Ok(());
                };
                let result = self.send(&command, false).await;
                if !matches!(result, Err(GrblError::NotReady)) {
                    self.queue.commit_front(&command);
                }
                result
            }
        }
    }

    // ------------------------------------------------------------------
    // Worker loop
    // ------------------------------------------------------------------

    /// Handle one request from a handle. Returns `false` on abort.
    pub async fn handle_request(&mut self, request: LinkRequest) -> bool {
        match request {
            LinkRequest::Send {
                command,
                suppress_ack,
                reply,
            } => {
                let result = self.send(&command, suppress_ack).await;
                let _ = reply.send(result);
                true
            }
            LinkRequest::Realtime { command, reply } => {
                let result = self.send_realtime(command).await;
                let _ = reply.send(result);
                true
            }
            LinkRequest::Abort => {
                info!("Abort received");
                self.emit(LinkEvent::message("Abort received"));
                false
            }
        }
    }

    /// Run the worker until aborted, until every handle is dropped, or
    /// until the transport fails.
    ///
    /// On exit the transport is shut down and [`LinkEvent::Terminated`] is
    /// emitted. Commands still queued are abandoned.
    pub async fn run(
        mut self,
        mut requests: mpsc::Receiver<LinkRequest>,
        status: watch::Sender<LinkStatus>,
    ) -> Result<()> {
        info!(baud = self.config.baud_rate, "Link running");
        self.emit(LinkEvent::message("Link running"));

        let result = loop {
            if !self.service_requests(&mut requests).await {
                break Ok(());
            }

            if let Err(e) = self.poll_transport().await {
                error!("Read loop error: {}", e);
                break Err(e);
            }

            if let Err(e) = self.drain_queue().await {
                if !e.is_recoverable() {
                    error!("Queue drain error: {}", e);
                    break Err(e);
                }
            }

            let current = self.flow.status();
            status.send_if_modified(|published| {
                if *published != current {
                    *published = current;
                    true
                } else {
                    false
                }
            });
        };

        self.emit(LinkEvent::message("Closing transport"));
        if let Err(e) = self.transport.shutdown().await {
            debug!(error = %e, "Transport shutdown failed");
        }
        status.send_replace(self.flow.status());
        self.emit(LinkEvent::Terminated);
        result
    }

    /// Drain pending requests. Returns `false` if the worker must stop.
    async fn service_requests(&mut self, requests: &mut mpsc::Receiver<LinkRequest>) -> bool {
        loop {
            match requests.try_recv() {
                Ok(request) => {
                    if !self.handle_request(request).await {
                        return false;
                    }
                }
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    debug!("All link handles dropped");
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};
    use tokio::sync::mpsc::UnboundedReceiver;

    const BANNER: &str = "Grbl 1.1f ['$' for help]";

    type TestLink = Link<DuplexStream, mpsc::UnboundedSender<LinkEvent>>;

    fn test_link(config: LinkConfig) -> (TestLink, DuplexStream, UnboundedReceiver<LinkEvent>) {
        let (host, grbl) = duplex(4096);
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Link::new(host, CommandQueue::new(), tx, config);
        (link, grbl, rx)
    }

    fn ready_link() -> (TestLink, DuplexStream, UnboundedReceiver<LinkEvent>) {
        let (mut link, grbl, mut rx) = test_link(LinkConfig::default());
        link.handle_line(BANNER);
        drain(&mut rx);
        (link, grbl, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<LinkEvent>) -> Vec<LinkEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn without_traces(events: Vec<LinkEvent>) -> Vec<LinkEvent> {
        events
            .into_iter()
            .filter(|e| !matches!(e, LinkEvent::Trace { .. } | LinkEvent::Message { .. }))
            .collect()
    }

    async fn read_sent(grbl: &mut DuplexStream) -> Vec<u8> {
        let mut buf = vec![0u8; 256];
        let n = grbl.read(&mut buf).await.unwrap();
        buf.truncate(n);
        buf
    }

    #[test]
    fn test_init_enables_sending() {
        let (mut link, _grbl, mut rx) = test_link(LinkConfig::default());

        let message = link.handle_line(BANNER);

        assert!(matches!(message, GrblMessage::Init { .. }));
        assert!(link.flow().send_allowed());
        assert_eq!(
            without_traces(drain(&mut rx)),
            vec![
                LinkEvent::Init {
                    banner: BANNER.to_string()
                },
                LinkEvent::GrblReady
            ]
        );
    }

    #[test]
    fn test_every_line_is_traced() {
        let (mut link, _grbl, mut rx) = test_link(LinkConfig::default());

        link.feed(b"[MSG:Caution: Unlocked]\r\n");

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                LinkEvent::Trace {
                    direction: Direction::Inbound,
                    line: "[MSG:Caution: Unlocked]".to_string()
                },
                LinkEvent::Data {
                    line: "[MSG:Caution: Unlocked]".to_string()
                }
            ]
        );
    }

    #[test]
    fn test_status_updates_machine_state() {
        let (mut link, _grbl, mut rx) = ready_link();

        link.handle_line("<Run|MPos:1.000,0.000,0.000|FS:300,0>");

        assert_eq!(link.flow().machine_state(), "Run");
        assert_eq!(
            without_traces(drain(&mut rx)),
            vec![LinkEvent::Status {
                raw: "<Run|MPos:1.000,0.000,0.000|FS:300,0>".to_string(),
                state: "Run".to_string()
            }]
        );
    }

    #[test]
    fn test_alarm_keeps_send_window() {
        let (mut link, _grbl, mut rx) = ready_link();

        link.handle_line("ALARM:1");

        assert!(link.flow().send_allowed());
        let events = without_traces(drain(&mut rx));
        match &events[..] {
            [LinkEvent::Alarm {
                code: Some(1),
                description: Some(description),
                ..
            }] => assert!(description.starts_with("Hard limit")),
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_is_reported_and_recovered() {
        let (mut link, _grbl, mut rx) = ready_link();

        link.feed(b"\xff\xfe\r\n");
        link.feed(b"ok\r\n");

        let events = drain(&mut rx);
        assert!(matches!(&events[0], LinkEvent::Message { text } if text.starts_with("Receive error")));
        assert!(events.contains(&LinkEvent::Ok));
    }

    #[tokio::test]
    async fn test_ok_before_oversize_fragment_releases_slot() {
        let config = LinkConfig {
            max_line_len: 8,
            ..LinkConfig::default()
        };
        let (mut link, mut grbl, mut rx) = test_link(config);
        link.handle_line(BANNER);
        link.send("G0 X1", false).await.unwrap();
        assert_eq!(read_sent(&mut grbl).await, b"G0 X1\n");
        drain(&mut rx);

        link.feed(b"ok\r\n[MSG:0123456789");

        assert!(link.flow().send_allowed());
        let events = drain(&mut rx);
        let ok = events.iter().position(|e| *e == LinkEvent::Ok);
        let error = events.iter().position(
            |e| matches!(e, LinkEvent::Message { text } if text.starts_with("Receive error")),
        );
        assert!(ok.is_some() && error.is_some());
        assert!(ok < error);
    }

    #[tokio::test]
    async fn test_send_appends_terminator_and_closes_window() {
        let (mut link, mut grbl, mut rx) = ready_link();

        link.send("G0 X10", false).await.unwrap();

        assert_eq!(read_sent(&mut grbl).await, b"G0 X10\n");
        assert!(!link.flow().send_allowed());
        assert!(link.flow().last_send().is_some());
        let events = drain(&mut rx);
        assert!(events.contains(&LinkEvent::Trace {
            direction: Direction::Outbound,
            line: "G0 X10\\n".to_string()
        }));
        assert!(events.contains(&LinkEvent::SendOk));
    }

    #[tokio::test]
    async fn test_send_when_not_ready_does_no_io() {
        let (mut link, mut grbl, mut rx) = test_link(LinkConfig::default());

        let result = link.send("G0 X10", false).await;

        assert!(matches!(result, Err(GrblError::NotReady)));
        let events = drain(&mut rx);
        assert!(!events.contains(&LinkEvent::SendOk));

        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_millis(20), grbl.read(&mut buf)).await;
        assert!(read.is_err(), "nothing must be written");
    }

    #[tokio::test]
    async fn test_error_response_reopens_window() {
        let (mut link, _grbl, mut rx) = ready_link();
        link.send("G5", false).await.unwrap();
        drain(&mut rx);

        link.handle_line("error:20");

        assert!(link.flow().send_allowed());
        assert_eq!(
            without_traces(drain(&mut rx)),
            vec![LinkEvent::Error {
                code: Some(20),
                line: "error:20".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_suppressed_ok_is_not_surfaced() {
        let (mut link, mut grbl, mut rx) = ready_link();

        link.send("$G", true).await.unwrap();
        assert_eq!(read_sent(&mut grbl).await, b"$G\n");
        assert_eq!(link.flow().suppressed_oks(), 1);
        drain(&mut rx);

        link.feed(b"[GC:G0 G54 G17 G21 G90 G94 M5 M9 T0 F0 S0]\r\nok\r\n");

        assert_eq!(link.flow().suppressed_oks(), 0);
        assert!(link.flow().send_allowed());
        let events = drain(&mut rx);
        assert!(!events.contains(&LinkEvent::Ok));

        // The next ok is surfaced again
        link.send("G0 X1", false).await.unwrap();
        link.feed(b"ok\r\n");
        assert!(drain(&mut rx).contains(&LinkEvent::Ok));
    }

    #[tokio::test]
    async fn test_realtime_bypasses_and_preserves_window() {
        let (mut link, mut grbl, _rx) = test_link(LinkConfig::default());

        // Not initialized, window closed
        link.send_realtime(RealtimeCommand::Hold).await.unwrap();
        assert_eq!(read_sent(&mut grbl).await, vec![0xA0]);
        assert!(!link.flow().send_allowed());

        link.handle_line(BANNER);
        link.send("\u{85}", false).await.unwrap();
        assert_eq!(read_sent(&mut grbl).await, vec![0x85]);
        assert!(link.flow().send_allowed());
    }

    #[tokio::test]
    async fn test_soft_reset_returns_to_uninitialized() {
        let (mut link, mut grbl, _rx) = ready_link();

        link.send_realtime(RealtimeCommand::SoftReset).await.unwrap();

        assert_eq!(read_sent(&mut grbl).await, vec![0x18]);
        assert_eq!(link.flow().phase(), crate::flow::LinkPhase::Uninitialized);
        assert!(link.flow().send_allowed());
    }

    #[tokio::test]
    async fn test_drain_empty_queue_is_noop() {
        let (mut link, _grbl, mut rx) = ready_link();
        let before = link.status();

        link.drain_queue().await.unwrap();

        assert_eq!(link.status(), before);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_drain_sends_one_command_per_ack() {
        let (mut link, mut grbl, _rx) = ready_link();
        link.queue().extend(["G21", "G90"]);

        link.drain_queue().await.unwrap();
        assert_eq!(read_sent(&mut grbl).await, b"G21\n");
        assert_eq!(link.queue().count(), 1);

        // Waiting for ok: the next command stays queued
        link.drain_queue().await.unwrap();
        assert_eq!(link.queue().front().as_deref(), Some("G90"));

        link.handle_line("ok");
        link.drain_queue().await.unwrap();
        assert_eq!(read_sent(&mut grbl).await, b"G90\n");
        assert!(link.queue().is_empty());
    }

    #[tokio::test]
    async fn test_drain_waits_for_banner() {
        let (mut link, _grbl, mut rx) = test_link(LinkConfig::default());
        link.queue().push("G21");

        link.drain_queue().await.unwrap();

        assert_eq!(link.queue().count(), 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_clears_queue_once() {
        let config = LinkConfig::default().with_stall_timeout(Duration::from_secs(60));
        let (mut link, _grbl, mut rx) = test_link(config);
        link.handle_line(BANNER);
        link.queue().extend(["G0 X1", "G0 X2", "G0 X3"]);

        link.drain_queue().await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        link.drain_queue().await.unwrap();
        assert_eq!(link.queue().count(), 2);

        tokio::time::advance(Duration::from_secs(31)).await;
        let result = link.drain_queue().await;
        assert!(matches!(result, Err(GrblError::Stalled { discarded: 2 })));
        assert!(link.queue().is_empty());

        // Further commands are held, and the stall is not reported again
        link.queue().push("G0 X4");
        link.drain_queue().await.unwrap();
        assert_eq!(link.queue().count(), 1);

        let stalls = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, LinkEvent::Stalled { .. }))
            .count();
        assert_eq!(stalls, 1);
    }

    #[tokio::test]
    async fn test_handle_request_replies() {
        let (mut link, mut grbl, _rx) = ready_link();
        let (reply, response) = oneshot::channel();

        let keep_running = link
            .handle_request(LinkRequest::Send {
                command: "$X".to_string(),
                suppress_ack: false,
                reply,
            })
            .await;

        assert!(keep_running);
        assert!(response.await.unwrap().is_ok());
        assert_eq!(read_sent(&mut grbl).await, b"$X\n");
        assert!(!link.handle_request(LinkRequest::Abort).await);
    }
}
