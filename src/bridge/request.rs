//! Single-flight command forwarding and reply relay.

use std::sync::Arc;
use std::sync::mpsc::{self, SyncSender};
use std::thread;
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, error, info, warn};

use super::ChunkSink;
use super::state::{RequestState, StateCell};
use crate::app::ports::TelemetrySink;
use crate::config::{GatewayConfig, MAX_FRAME_LEN, REPLY_QUEUE_DEPTH};
use crate::diagnostics::GatewayStats;
use crate::error::{GatewayError, Result};
use crate::link::frame::TERMINATOR;
use crate::link::{AckOutcome, Deadline, Frame, FrameBuf, FrameContext, SerialLink, SerialSession, Transport, Wait};
use crate::tasks::{self, Core, priority};

/// One relayed frame with its terminator restored.
pub const REPLY_CHUNK_LEN: usize = MAX_FRAME_LEN + 1;
pub type ReplyChunk = heapless::Vec<u8, REPLY_CHUNK_LEN>;

const REPLY_PUSH_RETRY: Duration = Duration::from_millis(5);
/// Pause between drain passes while the relay is still streaming.
const DRAIN_POLL: Duration = Duration::from_millis(10);
/// Slack on top of the relay budget before `poll` stops waiting for a
/// relay thread that never reported back.
const RELAY_GRACE: Duration = Duration::from_secs(2);
const RELAY_STACK_KB: usize = 8;

/// Answer to `/out`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitiateOutcome {
    /// The mesh acknowledged; carries the ack line.  Replies are streaming.
    Accepted(FrameBuf),
    /// The mesh answered with something other than `ok,`.
    Rejected(FrameBuf),
    TimedOut,
    /// The link could not be acquired in time.
    Busy,
    /// Another request is in flight; nothing was sent.
    AlreadyPending,
    Failed(GatewayError),
}

/// Answer to `/ans`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No acknowledged request to drain.
    NothingPending,
    Drained { chunks: usize, timed_out: bool },
}

pub struct RequestBridge<T> {
    link: Arc<SerialLink<T>>,
    telemetry: Arc<dyn TelemetrySink>,
    stats: Arc<GatewayStats>,
    state: StateCell,
    replies: Channel<CriticalSectionRawMutex, ReplyChunk, REPLY_QUEUE_DEPTH>,
    lock_wait: Duration,
    ack_timeout: Duration,
    relay_budget: Duration,
}

impl<T: Transport + Send + 'static> RequestBridge<T> {
    pub fn new(
        link: Arc<SerialLink<T>>,
        telemetry: Arc<dyn TelemetrySink>,
        stats: Arc<GatewayStats>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            link,
            telemetry,
            stats,
            state: StateCell::new(),
            replies: Channel::new(),
            lock_wait: config.request_lock_wait(),
            ack_timeout: config.ack_timeout(),
            relay_budget: config.relay_budget(),
        }
    }

    pub fn state(&self) -> RequestState {
        self.state.get()
    }

    pub fn is_idle(&self) -> bool {
        self.state.get() == RequestState::Idle
    }

    /// Forward `command` to the mesh and wait for its acknowledgement.
    ///
    /// Returns [`InitiateOutcome::AlreadyPending`] without touching the
    /// link unless the bridge is idle.  On acceptance the relay thread
    /// keeps the link and streams the reply parts for [`Self::poll`].
    pub fn initiate(self: &Arc<Self>, command: &str) -> InitiateOutcome {
        if !self.state.transition(RequestState::Idle, RequestState::Sent) {
            debug!("Bridge: request already pending ({:?})", self.state.get());
            return InitiateOutcome::AlreadyPending;
        }
        // Leftovers of an abandoned stream must not leak into this one.
        while self.replies.try_receive().is_ok() {}

        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        let bridge = Arc::clone(self);
        let payload = command.as_bytes().to_vec();
        let spawned = tasks::spawn_on_core(
            Core::App,
            priority::RELAY,
            RELAY_STACK_KB,
            "relay\0",
            move || bridge.exchange(&payload, ack_tx),
        );
        if let Err(e) = spawned {
            error!("Bridge: relay thread spawn failed: {}", e);
            self.state.set(RequestState::Idle);
            return InitiateOutcome::Failed(GatewayError::Transport);
        }

        match ack_rx.recv() {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("Bridge: relay thread exited without an outcome");
                self.state.set(RequestState::Idle);
                InitiateOutcome::Failed(GatewayError::Transport)
            }
        }
    }

    /// Relay thread body: the complete exchange for one command.
    fn exchange(&self, command: &[u8], ack_tx: SyncSender<InitiateOutcome>) {
        let mut session = match self.link.acquire(Wait::Bounded(self.lock_wait)) {
            Ok(session) => session,
            Err(_) => {
                self.stats.record_link_busy();
                warn!("Bridge: link busy, command not sent");
                self.finish_early(InitiateOutcome::Busy, &ack_tx);
                return;
            }
        };

        if let Err(e) = session.send(command) {
            drop(session);
            self.finish_early(InitiateOutcome::Failed(e), &ack_tx);
            return;
        }
        self.state.set(RequestState::AwaitingAck);

        let ack = match session.wait_for_ack(self.ack_timeout, self.telemetry.as_ref()) {
            Ok(ack) => ack,
            Err(e) => {
                drop(session);
                self.finish_early(InitiateOutcome::Failed(e), &ack_tx);
                return;
            }
        };

        match ack {
            AckOutcome::Ok(line) => {
                self.stats.record_ack_ok();
                self.state.set(RequestState::Streaming);
                let _ = ack_tx.send(InitiateOutcome::Accepted(line));

                let completed = self.relay(&mut session);
                drop(session);
                if completed {
                    self.state.set(RequestState::Complete);
                } else {
                    warn!("Bridge: reply stream cut at {:?} budget", self.relay_budget);
                    self.state.set(RequestState::TimedOut);
                }
            }
            AckOutcome::NotOk(line) => {
                self.stats.record_ack_not_ok();
                warn!("Bridge: command refused: {}", String::from_utf8_lossy(&line));
                drop(session);
                self.finish_early(InitiateOutcome::Rejected(line), &ack_tx);
            }
            AckOutcome::Timeout => {
                self.stats.record_ack_timeout();
                warn!("Bridge: ack timeout after {:?}", self.ack_timeout);
                drop(session);
                self.finish_early(InitiateOutcome::TimedOut, &ack_tx);
            }
        }
    }

    /// The link is already released; make the bridge idle, then answer.
    fn finish_early(&self, outcome: InitiateOutcome, ack_tx: &SyncSender<InitiateOutcome>) {
        self.state.set(RequestState::Idle);
        let _ = ack_tx.send(outcome);
    }

    /// Stream reply parts until a terminal code or the budget runs out.
    /// Returns `true` only if a terminal part was seen and every part
    /// before it reached the reply queue.
    fn relay(&self, session: &mut SerialSession<'_, T>) -> bool {
        let deadline = Deadline::after(self.relay_budget);
        let mut parts = 0usize;
        loop {
            if deadline.expired() {
                return false;
            }
            let line = match session.read_frame(deadline.remaining()) {
                Ok(Some(line)) => line,
                Ok(None) => return false,
                Err(e) => {
                    error!("Bridge: relay read failed: {}", e);
                    return false;
                }
            };

            match Frame::classify(&line, FrameContext::Reply) {
                Frame::Telemetry { payload } => {
                    let _ = self.telemetry.offer(payload);
                }
                Frame::Control { code } if code.is_reply_part() => {
                    if !self.push_reply(&line, deadline) {
                        error!("Bridge: reply queue full, stream cut after {} parts", parts);
                        return false;
                    }
                    parts += 1;
                    if code.is_terminal() {
                        info!("Bridge: reply complete ({} parts)", parts);
                        return true;
                    }
                }
                Frame::Control { .. } | Frame::Ack { .. } | Frame::Malformed => {
                    self.stats.record_protocol_violation();
                    warn!(
                        "Bridge: unexpected reply part discarded: {}",
                        String::from_utf8_lossy(&line)
                    );
                }
            }
        }
    }

    /// Queue one part for `/ans`, waiting for room until `deadline`.
    fn push_reply(&self, line: &[u8], deadline: Deadline) -> bool {
        let mut chunk = ReplyChunk::new();
        // line.len() <= MAX_FRAME_LEN, so line plus terminator always fits.
        let _ = chunk.extend_from_slice(line);
        let _ = chunk.push(TERMINATOR);

        loop {
            match self.replies.try_send(chunk) {
                Ok(()) => return true,
                Err(embassy_sync::channel::TrySendError::Full(back)) => {
                    if deadline.expired() {
                        return false;
                    }
                    chunk = back;
                    thread::sleep(REPLY_PUSH_RETRY);
                }
            }
        }
    }

    /// Hand every reply part of the current request to `sink`, then the
    /// closing empty chunk, and return the bridge to idle.
    ///
    /// Waits while the relay is still streaming.  A sink error stops the
    /// forwarding but the stream is still drained so the bridge never
    /// stays stuck; the first sink error is returned.
    pub fn poll(&self, sink: &mut dyn ChunkSink) -> Result<PollOutcome> {
        if !self.state.get().has_replies() {
            return Ok(PollOutcome::NothingPending);
        }

        let guard = Deadline::after(self.relay_budget + RELAY_GRACE);
        let mut chunks = 0;
        let mut sink_error = None;
        let last = loop {
            // Read the state before draining: every part pushed before the
            // relay went terminal is then guaranteed to be drained below.
            let state = self.state.get();
            while let Ok(chunk) = self.replies.try_receive() {
                if sink_error.is_none() {
                    match sink.send_chunk(&chunk) {
                        Ok(()) => chunks += 1,
                        Err(e) => {
                            warn!("Bridge: reply sink failed: {}", e);
                            sink_error = Some(e);
                        }
                    }
                }
            }
            if state.is_terminal() {
                break state;
            }
            if guard.expired() {
                error!("Bridge: relay never finished, abandoning stream");
                break RequestState::TimedOut;
            }
            thread::sleep(DRAIN_POLL);
        };

        if sink_error.is_none() {
            if let Err(e) = sink.send_chunk(&[]) {
                sink_error = Some(e);
            }
        }
        if !self.state.transition(last, RequestState::Idle) {
            self.state.set(RequestState::Idle);
        }
        debug!("Bridge: {} reply parts drained", chunks);

        match sink_error {
            Some(e) => Err(e),
            None => Ok(PollOutcome::Drained {
                chunks,
                timed_out: last == RequestState::TimedOut,
            }),
        }
    }
}
