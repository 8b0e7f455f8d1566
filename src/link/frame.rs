//! Frame classification for the mesh serial protocol.
//!
//! A frame is everything up to (not including) the `;` terminator:
//!
//! ```text
//!   #xxxAABBCCDDEEFF,87      telemetry (3-byte header after '#')
//!   ok,                      acknowledgement of a forwarded command
//!   008,<data>               reply part, more to follow
//!   009,<data>               final reply part (007 is also terminal)
//! ```
//!
//! Classification is pure and independent of I/O so it can be tested and
//! fuzzed in isolation.

use crate::config::MAX_FRAME_LEN;

pub const TERMINATOR: u8 = b';';
pub const TELEMETRY_MARKER: u8 = b'#';
/// The marker plus a three-byte header precede every telemetry payload.
pub const TELEMETRY_HEADER_LEN: usize = 4;
const ACK_PREFIX: &[u8] = b"ok,";

/// One received frame, terminator stripped.
pub type FrameBuf = heapless::Vec<u8, MAX_FRAME_LEN>;

/// Three-digit code leading a reply frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCode {
    /// `007`: final part of a reply that announced more responses.
    Partial,
    /// `008`: continuation, more parts follow.
    Continuation,
    /// `009`: final part.
    Final,
    Other(u16),
}

impl ControlCode {
    pub const fn from_value(value: u16) -> Self {
        match value {
            7 => Self::Partial,
            8 => Self::Continuation,
            9 => Self::Final,
            other => Self::Other(other),
        }
    }

    /// Codes relayed to the HTTP caller; any other code inside a reply
    /// stream is a protocol violation.
    pub const fn is_reply_part(self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Codes that end a relayed reply stream.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Partial | Self::Final)
    }
}

/// Which exchange the frame arrived in; it decides how non-telemetry
/// frames are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameContext {
    /// Waiting for the acknowledgement of a command just written.
    Ack,
    /// Relaying the reply stream of an acknowledged command.
    Reply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    Control { code: ControlCode },
    /// Payload with the marker and header removed.
    Telemetry { payload: &'a [u8] },
    Ack { ok: bool },
    Malformed,
}

impl<'a> Frame<'a> {
    pub fn classify(line: &'a [u8], context: FrameContext) -> Self {
        if line.first() == Some(&TELEMETRY_MARKER) {
            return match line.get(TELEMETRY_HEADER_LEN..) {
                Some(payload) if !payload.is_empty() => Self::Telemetry { payload },
                _ => Self::Malformed,
            };
        }
        match context {
            FrameContext::Ack => Self::Ack {
                ok: line.starts_with(ACK_PREFIX),
            },
            FrameContext::Reply => match control_code(line) {
                Some(code) => Self::Control { code },
                None => Self::Malformed,
            },
        }
    }

    pub fn is_telemetry(&self) -> bool {
        matches!(self, Self::Telemetry { .. })
    }
}

fn control_code(line: &[u8]) -> Option<ControlCode> {
    let digits = line.get(..3)?;
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let value = digits
        .iter()
        .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
    Some(ControlCode::from_value(value))
}
