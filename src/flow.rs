//! Single-slot flow control.
//!
//! Grbl accepts one line-buffered command at a time and answers each with
//! `ok` or `error:N`. [`FlowControl`] tracks whether that slot is free, how
//! many upcoming `ok`s belong to side-channel commands and must be swallowed,
//! and when the last command went out so a stalled firmware can be detected.
//!
//! # State machine
//!
//! ```text
//! Uninitialized --banner--> Ready --line sent--> AwaitingAck
//!                             ^                      |
//!                             +----ok / error:N------+
//!                                                    |
//!                                              stall timeout
//!                                                    v
//! Uninitialized <--soft reset-- Stalled (queue cleared)
//! ```
//!
//! The state is owned by the link worker and mutated only from it, so no
//! synchronization is involved.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::{GrblError, Result};

/// Phase of the link as seen by the queue drainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPhase {
    /// No banner received yet (or a soft reset was sent).
    Uninitialized,
    /// The command slot is free.
    Ready,
    /// A line was sent and its acknowledgment is pending.
    AwaitingAck,
    /// The acknowledgment never came; draining halted until reset.
    Stalled,
}

/// What the drainer should do on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainAction {
    /// Leave the queue alone.
    Wait,
    /// Send the front of the queue.
    Send,
    /// Declare a stall and clear the queue.
    Stall,
}

/// Point-in-time view of the flow-control state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    pub phase: LinkPhase,
    pub send_allowed: bool,
    pub suppressed_oks: u32,
    pub machine_state: String,
}

impl Default for LinkStatus {
    fn default() -> Self {
        FlowControl::new().status()
    }
}

/// Flow-control state for one link.
#[derive(Debug, Clone)]
pub struct FlowControl {
    send_allowed: bool,
    suppress_next_ok: u32,
    last_send: Option<Instant>,
    machine_state: String,
    phase: LinkPhase,
}

impl FlowControl {
    /// Create the state of a freshly opened link.
    pub fn new() -> Self {
        Self {
            send_allowed: false,
            suppress_next_ok: 0,
            last_send: None,
            machine_state: String::new(),
            phase: LinkPhase::Uninitialized,
        }
    }

    /// Whether a line-buffered command may be sent now.
    #[inline]
    pub fn send_allowed(&self) -> bool {
        self.send_allowed
    }

    /// Number of upcoming `ok`s that will be swallowed.
    #[inline]
    pub fn suppressed_oks(&self) -> u32 {
        self.suppress_next_ok
    }

    /// When the last line-buffered command was transmitted.
    #[inline]
    pub fn last_send(&self) -> Option<Instant> {
        self.last_send
    }

    /// Last machine state reported by Grbl (informational).
    pub fn machine_state(&self) -> &str {
        &self.machine_state
    }

    #[inline]
    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    /// Snapshot for observers.
    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            phase: self.phase,
            send_allowed: self.send_allowed,
            suppressed_oks: self.suppress_next_ok,
            machine_state: self.machine_state.clone(),
        }
    }

    /// Grbl printed its banner: the slot is free and nothing is pending.
    pub fn on_init(&mut self) {
        self.send_allowed = true;
        self.suppress_next_ok = 0;
        self.machine_state = "Idle".to_string();
        self.phase = LinkPhase::Ready;
    }

    /// An `ok` arrived. Returns `true` if it should be surfaced, `false` if
    /// it was consumed by a suppressed side-channel command.
    pub fn on_ok(&mut self) -> bool {
        self.release_slot();
        if self.suppress_next_ok > 0 {
            self.suppress_next_ok -= 1;
            false
        } else {
            true
        }
    }

    /// An `error:N` arrived. The rejected command still occupied the slot.
    pub fn on_error(&mut self) {
        self.release_slot();
    }

    /// A status report arrived.
    pub fn on_status(&mut self, state: &str) {
        if self.machine_state != state {
            self.machine_state = state.to_string();
        }
    }

    fn release_slot(&mut self) {
        self.send_allowed = true;
        if self.phase != LinkPhase::Stalled {
            self.phase = LinkPhase::Ready;
        }
    }

    /// Check whether a command may be transmitted.
    ///
    /// Real-time commands are always allowed.
    pub fn check_send(&self, realtime: bool) -> Result<()> {
        if realtime || self.send_allowed {
            Ok(())
        } else {
            Err(GrblError::NotReady)
        }
    }

    /// Swallow the `ok` of the command about to be sent.
    pub fn suppress_next_ok(&mut self) {
        self.suppress_next_ok += 1;
    }

    /// Undo [`suppress_next_ok`](Self::suppress_next_ok) for a command that
    /// never reached Grbl.
    pub fn cancel_suppression(&mut self) {
        self.suppress_next_ok = self.suppress_next_ok.saturating_sub(1);
    }

    /// A line-buffered command was written; its acknowledgment is now owed.
    ///
    /// Only a link that has seen the banner starts waiting for the
    /// acknowledgment. Before the banner (e.g. right after a soft reset) the
    /// phase stays `Uninitialized` and the next banner reopens the window.
    pub fn on_line_sent(&mut self, now: Instant) {
        self.send_allowed = false;
        self.last_send = Some(now);
        if matches!(self.phase, LinkPhase::Ready | LinkPhase::AwaitingAck) {
            self.phase = LinkPhase::AwaitingAck;
        }
    }

    /// A soft reset was sent. Grbl reboots and will print its banner again.
    ///
    /// The send window itself is left as is.
    pub fn on_soft_reset(&mut self) {
        self.phase = LinkPhase::Uninitialized;
    }

    /// Decide what the queue drainer does at `now`.
    pub fn drain_action(&self, now: Instant, stall_timeout: Duration) -> DrainAction {
        match self.phase {
            LinkPhase::Ready => DrainAction::Send,
            LinkPhase::AwaitingAck => {
                let stalled = self
                    .last_send
                    .map(|sent| now.saturating_duration_since(sent) >= stall_timeout)
                    .unwrap_or(false);
                if stalled {
                    DrainAction::Stall
                } else {
                    DrainAction::Wait
                }
            }
            LinkPhase::Uninitialized | LinkPhase::Stalled => DrainAction::Wait,
        }
    }

    /// The stall was reported and the queue cleared.
    pub fn on_stall(&mut self) {
        self.phase = LinkPhase::Stalled;
    }
}

impl Default for FlowControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(60);

    fn ready() -> FlowControl {
        let mut flow = FlowControl::new();
        flow.on_init();
        flow
    }

    #[test]
    fn test_initial_state() {
        let flow = FlowControl::new();
        assert!(!flow.send_allowed());
        assert_eq!(flow.phase(), LinkPhase::Uninitialized);
        assert_eq!(flow.suppressed_oks(), 0);
        assert!(flow.last_send().is_none());
    }

    #[test]
    fn test_init_allows_send() {
        let flow = ready();
        assert!(flow.send_allowed());
        assert_eq!(flow.phase(), LinkPhase::Ready);
        assert_eq!(flow.machine_state(), "Idle");
    }

    #[test]
    fn test_send_then_ok_cycle() {
        let mut flow = ready();

        for _ in 0..3 {
            flow.check_send(false).unwrap();
            flow.on_line_sent(Instant::now());
            assert!(!flow.send_allowed());
            assert_eq!(flow.phase(), LinkPhase::AwaitingAck);
            assert!(matches!(flow.check_send(false), Err(GrblError::NotReady)));

            assert!(flow.on_ok());
            assert!(flow.send_allowed());
            assert_eq!(flow.phase(), LinkPhase::Ready);
        }
    }

    #[test]
    fn test_error_releases_slot() {
        let mut flow = ready();
        flow.on_line_sent(Instant::now());

        flow.on_error();

        assert!(flow.send_allowed());
        assert_eq!(flow.phase(), LinkPhase::Ready);
    }

    #[test]
    fn test_suppressed_oks_are_consumed() {
        let mut flow = ready();
        flow.suppress_next_ok();
        flow.suppress_next_ok();
        assert_eq!(flow.suppressed_oks(), 2);

        assert!(!flow.on_ok());
        assert_eq!(flow.suppressed_oks(), 1);
        assert!(flow.send_allowed());

        assert!(!flow.on_ok());
        assert_eq!(flow.suppressed_oks(), 0);

        assert!(flow.on_ok());
        assert_eq!(flow.suppressed_oks(), 0);
    }

    #[test]
    fn test_cancel_suppression() {
        let mut flow = ready();
        flow.suppress_next_ok();

        flow.cancel_suppression();
        flow.cancel_suppression();

        assert_eq!(flow.suppressed_oks(), 0);
        assert!(flow.on_ok());
    }

    #[test]
    fn test_realtime_bypasses_window() {
        let flow = FlowControl::new();
        assert!(flow.check_send(true).is_ok());
        assert!(flow.check_send(false).is_err());
    }

    #[test]
    fn test_status_updates_machine_state_only() {
        let mut flow = ready();
        flow.on_line_sent(Instant::now());

        flow.on_status("Run");

        assert_eq!(flow.machine_state(), "Run");
        assert!(!flow.send_allowed());
    }

    #[test]
    fn test_drain_action_by_phase() {
        let now = Instant::now();
        assert_eq!(FlowControl::new().drain_action(now, TIMEOUT), DrainAction::Wait);
        assert_eq!(ready().drain_action(now, TIMEOUT), DrainAction::Send);
    }

    #[test]
    fn test_drain_action_detects_stall() {
        let mut flow = ready();
        let sent = Instant::now();
        flow.on_line_sent(sent);

        assert_eq!(
            flow.drain_action(sent + Duration::from_secs(59), TIMEOUT),
            DrainAction::Wait
        );
        assert_eq!(flow.drain_action(sent + TIMEOUT, TIMEOUT), DrainAction::Stall);

        flow.on_stall();
        assert_eq!(flow.phase(), LinkPhase::Stalled);
        assert_eq!(
            flow.drain_action(sent + Duration::from_secs(3600), TIMEOUT),
            DrainAction::Wait
        );
    }

    #[test]
    fn test_late_ok_does_not_leave_stalled() {
        let mut flow = ready();
        flow.on_line_sent(Instant::now());
        flow.on_stall();

        assert!(flow.on_ok());

        assert!(flow.send_allowed());
        assert_eq!(flow.phase(), LinkPhase::Stalled);
    }

    #[test]
    fn test_soft_reset_then_banner_recovers() {
        let mut flow = ready();
        flow.on_line_sent(Instant::now());
        flow.on_stall();

        flow.on_soft_reset();
        assert_eq!(flow.phase(), LinkPhase::Uninitialized);
        assert!(!flow.send_allowed());

        flow.on_init();
        assert_eq!(flow.phase(), LinkPhase::Ready);
        assert!(flow.send_allowed());
    }

    #[test]
    fn test_send_after_soft_reset_waits_for_banner() {
        let mut flow = ready();
        flow.on_soft_reset();
        assert!(flow.send_allowed());

        let sent = Instant::now();
        flow.on_line_sent(sent);

        assert_eq!(flow.phase(), LinkPhase::Uninitialized);
        assert!(!flow.send_allowed());
        // No stall clock runs before the banner
        assert_eq!(
            flow.drain_action(sent + Duration::from_secs(3600), TIMEOUT),
            DrainAction::Wait
        );

        flow.on_init();
        assert_eq!(flow.phase(), LinkPhase::Ready);
        assert!(flow.send_allowed());
    }

    #[test]
    fn test_init_resets_suppression() {
        let mut flow = ready();
        flow.suppress_next_ok();

        flow.on_init();

        assert_eq!(flow.suppressed_oks(), 0);
    }

    #[test]
    fn test_status_snapshot() {
        let mut flow = ready();
        flow.suppress_next_ok();

        let status = flow.status();

        assert_eq!(status.phase, LinkPhase::Ready);
        assert!(status.send_allowed);
        assert_eq!(status.suppressed_oks, 1);
        assert_eq!(status.machine_state, "Idle");
        assert_eq!(LinkStatus::default().phase, LinkPhase::Uninitialized);
    }
}
