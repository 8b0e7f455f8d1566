//! Request bridge: one HTTP-originated command at a time over the link.
//!
//! ```text
//!   /out ──▶ initiate() ──spawn──▶ relay thread ─────────────────────────┐
//!               ▲                  acquire · send · wait_for_ack         │
//!               └──── ack outcome ─┘  └─▶ stream 008/009 ─▶ [replies: 40] │
//!   /ans ──▶ poll() ◀──────────────────────────────────────── drain ─────┘
//! ```
//!
//! The relay thread performs the whole exchange, so the link stays locked
//! from the command write until the last reply part without a lock guard
//! ever changing threads.

pub mod request;
pub mod state;

pub use request::{InitiateOutcome, PollOutcome, REPLY_CHUNK_LEN, ReplyChunk, RequestBridge};
pub use state::{RequestState, StateCell};

/// Receives the reply stream of a bridged request, one chunk per frame.
/// The stream ends with an empty chunk.
pub trait ChunkSink {
    fn send_chunk(&mut self, chunk: &[u8]) -> crate::error::Result<()>;
}

/// Collects chunks in memory (host HTTP surface and tests).
impl ChunkSink for Vec<Vec<u8>> {
    fn send_chunk(&mut self, chunk: &[u8]) -> crate::error::Result<()> {
        self.push(chunk.to_vec());
        Ok(())
    }
}
