//! Single-flight request state.
//!
//! ```text
//!   Idle ─▶ Sent ─▶ AwaitingAck ─┬─▶ Streaming ─┬─▶ Complete ─┐
//!    ▲                           │              └─▶ TimedOut ─┤
//!    └──────── NotOk / Timeout / Busy ◀──────────             │
//!    └────────────────────── poll() drained ◀─────────────────┘
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestState {
    Idle = 0,
    Sent = 1,
    AwaitingAck = 2,
    Streaming = 3,
    Complete = 4,
    TimedOut = 5,
}

impl RequestState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Sent,
            2 => Self::AwaitingAck,
            3 => Self::Streaming,
            4 => Self::Complete,
            5 => Self::TimedOut,
            _ => Self::Idle,
        }
    }

    /// The relay has finished; only draining remains.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::TimedOut)
    }

    /// A reply stream exists (running or finished) that `/ans` can drain.
    pub const fn has_replies(self) -> bool {
        matches!(self, Self::Streaming | Self::Complete | Self::TimedOut)
    }
}

/// Atomic cell holding a [`RequestState`].
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub const fn new() -> Self {
        Self(AtomicU8::new(RequestState::Idle as u8))
    }

    pub fn get(&self) -> RequestState {
        RequestState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: RequestState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move `from` → `to` atomically; `false` if the state was not `from`.
    pub fn transition(&self, from: RequestState, to: RequestState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
