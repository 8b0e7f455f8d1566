//! Serial link to the mesh root node.
//!
//! ```text
//!   RequestBridge ─┐
//!   TelemetryIntake┼──▶ SerialLink (one mutex) ──▶ Transport (UART2)
//!   MeshWatch ─────┘
//! ```
//!
//! The link is the only shared owner of the transport.  Every task goes
//! through [`SerialLink::acquire`] and holds the returned
//! [`SerialSession`] for the whole exchange it performs.

pub mod frame;
pub mod serial;
pub mod transport;

use std::time::{Duration, Instant};

pub use frame::{ControlCode, Frame, FrameBuf, FrameContext};
pub use serial::{AckOutcome, SerialLink, SerialSession, Wait};
pub use transport::{NullTransport, Transport};

/// A point in time that budgets are checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self(Instant::now() + budget)
    }

    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.0
    }

    /// Time left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    pub fn instant(&self) -> Instant {
        self.0
    }
}
