//! Serial link arbitration and line framing.
//!
//! [`SerialLink`] owns the transport behind a timed mutex.  Acquisition is
//! either bounded (request bridge, telemetry intake, mesh watch) or
//! unbounded; the returned [`SerialSession`] is the only way to write to or
//! read from the transport, so holding it is holding the link.
//!
//! Received bytes are staged in a 1500-byte buffer and cut into frames at
//! the `;` terminator.  A run of 500 bytes without a terminator is handed
//! out as one frame so a noisy line can never wedge the buffer.

use std::thread;
use std::time::Duration;

use log::{debug, error, warn};
use parking_lot::{Mutex, MutexGuard};

use super::frame::{Frame, FrameBuf, FrameContext, TERMINATOR};
use super::transport::Transport;
use super::Deadline;
use crate::app::ports::TelemetrySink;
use crate::config::{MAX_FRAME_LEN, RX_BUFFER_LEN, SEGMENT_LEN};
use crate::error::{GatewayError, Result};

/// Sleep between transport polls while waiting for bytes.
const POLL_INTERVAL: Duration = Duration::from_millis(1);
/// How long a stalled write may retry before the link reports an I/O fault.
const WRITE_STALL_LIMIT: Duration = Duration::from_secs(1);
const READ_CHUNK: usize = 256;

/// How long [`SerialLink::acquire`] may wait for the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Bounded(Duration),
    Forever,
}

/// Result of waiting for the acknowledgement of a written command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// An `ok,` line; carries the line as received.
    Ok(FrameBuf),
    /// Any other non-telemetry line.
    NotOk(FrameBuf),
    Timeout,
}

struct LinkPort<T> {
    transport: T,
    rx: heapless::Vec<u8, RX_BUFFER_LEN>,
}

impl<T: Transport> LinkPort<T> {
    /// Cut the next complete frame out of the staging buffer.
    fn take_frame(&mut self) -> Option<FrameBuf> {
        let (frame_len, consumed) = match self.rx.iter().position(|&b| b == TERMINATOR) {
            Some(pos) => (pos.min(MAX_FRAME_LEN), pos + 1),
            None if self.rx.len() >= MAX_FRAME_LEN => (MAX_FRAME_LEN, MAX_FRAME_LEN),
            None => return None,
        };

        let mut frame = FrameBuf::new();
        // frame_len <= MAX_FRAME_LEN, so this cannot overflow.
        let _ = frame.extend_from_slice(&self.rx[..frame_len]);

        let rest = self.rx.len() - consumed;
        self.rx.copy_within(consumed.., 0);
        self.rx.truncate(rest);
        Some(frame)
    }

    /// Pull whatever the transport has into the staging buffer.
    fn fill(&mut self) -> Result<usize> {
        let space = RX_BUFFER_LEN - self.rx.len();
        if space == 0 {
            return Ok(0);
        }
        let mut chunk = [0u8; READ_CHUNK];
        let want = space.min(READ_CHUNK);
        let n = self.transport.read(&mut chunk[..want]).map_err(|e| {
            error!("Link: transport read failed: {:?}", e);
            GatewayError::Transport
        })?;
        let _ = self.rx.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        let stall = Deadline::after(WRITE_STALL_LIMIT);
        while !data.is_empty() {
            let n = self.transport.write(data).map_err(|e| {
                error!("Link: transport write failed: {:?}", e);
                GatewayError::Transport
            })?;
            if n == 0 {
                if stall.expired() {
                    error!("Link: transport write stalled");
                    return Err(GatewayError::Transport);
                }
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            data = &data[n.min(data.len())..];
        }
        Ok(())
    }
}

/// Mutual exclusion over the serial transport.
pub struct SerialLink<T> {
    port: Mutex<LinkPort<T>>,
    segment_gap: Duration,
}

impl<T: Transport> SerialLink<T> {
    /// `segment_gap` is the pause between consecutive 500-byte segments.
    pub fn new(transport: T, segment_gap: Duration) -> Self {
        Self {
            port: Mutex::new(LinkPort {
                transport,
                rx: heapless::Vec::new(),
            }),
            segment_gap,
        }
    }

    pub fn acquire(&self, wait: Wait) -> Result<SerialSession<'_, T>> {
        let port = match wait {
            Wait::Bounded(budget) => self
                .port
                .try_lock_for(budget)
                .ok_or(GatewayError::TransportBusy)?,
            Wait::Forever => self.port.lock(),
        };
        Ok(SerialSession {
            port,
            segment_gap: self.segment_gap,
        })
    }

    pub fn is_locked(&self) -> bool {
        self.port.is_locked()
    }
}

/// Exclusive access to the link; released on drop.
pub struct SerialSession<'a, T> {
    port: MutexGuard<'a, LinkPort<T>>,
    segment_gap: Duration,
}

impl<T: Transport> SerialSession<'_, T> {
    /// Write `payload` in segments of at most 500 bytes.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        let mut segments = payload.chunks(SEGMENT_LEN).peekable();
        while let Some(segment) = segments.next() {
            self.port.write_all(segment)?;
            if segments.peek().is_some() && !self.segment_gap.is_zero() {
                thread::sleep(self.segment_gap);
            }
        }
        self.port.transport.flush().map_err(|e| {
            error!("Link: transport flush failed: {:?}", e);
            GatewayError::Transport
        })?;
        debug!("Link: sent {} bytes", payload.len());
        Ok(())
    }

    /// True when a frame may be waiting, either staged or on the wire.
    pub fn has_pending(&self) -> bool {
        !self.port.rx.is_empty() || self.port.transport.available()
    }

    /// Next terminated frame, or `None` if none completed within `timeout`.
    /// A partially received frame stays staged for the next call.
    pub fn read_frame(&mut self, timeout: Duration) -> Result<Option<FrameBuf>> {
        let deadline = Deadline::after(timeout);
        loop {
            if let Some(frame) = self.port.take_frame() {
                return Ok(Some(frame));
            }
            if self.port.fill()? > 0 {
                continue;
            }
            if deadline.expired() {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL.min(deadline.remaining()));
        }
    }

    /// Wait for the acknowledgement of the command just written.
    ///
    /// Telemetry frames that arrive first are handed to `telemetry` and the
    /// wait continues; the first other line decides the outcome.
    pub fn wait_for_ack(
        &mut self,
        timeout: Duration,
        telemetry: &dyn TelemetrySink,
    ) -> Result<AckOutcome> {
        let deadline = Deadline::after(timeout);
        loop {
            if deadline.expired() {
                return Ok(AckOutcome::Timeout);
            }
            let Some(line) = self.read_frame(deadline.remaining())? else {
                return Ok(AckOutcome::Timeout);
            };
            match Frame::classify(&line, FrameContext::Ack) {
                Frame::Telemetry { payload } => {
                    // Drops are counted by the sink.
                    let _ = telemetry.offer(payload);
                }
                Frame::Ack { ok: true } => return Ok(AckOutcome::Ok(line)),
                Frame::Ack { ok: false } => return Ok(AckOutcome::NotOk(line)),
                Frame::Control { .. } | Frame::Malformed => {
                    warn!("Link: discarding malformed frame while awaiting ack");
                }
            }
        }
    }
}
