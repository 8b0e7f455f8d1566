//! Unified error types for the gateway core.
//!
//! Every fallible core operation (serial link, request bridge, telemetry
//! pipeline, registry) funnels into [`GatewayError`].  All variants are
//! `Copy` so they can be handed across task boundaries and stored in
//! counters without allocation.  Port-level errors (storage, clock, Wi-Fi)
//! live next to their traits in [`crate::app::ports`].

use core::fmt;

// ---------------------------------------------------------------------------
// Gateway error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayError {
    /// No terminated frame arrived before the deadline.
    TransportTimeout,
    /// The serial link mutex could not be acquired in time.
    TransportBusy,
    /// The underlying transport reported an I/O fault.
    Transport,
    /// A frame did not have the expected shape.
    ProtocolViolation,
    /// Telemetry arrived from a MAC that was never registered.
    UnknownDevice,
    /// A bounded queue was full; the message was dropped.
    QueueFull,
    /// A bridged request is already in flight.
    AlreadyPending,
    /// The MAC is already present in the registry.
    DuplicateRegistration,
    /// The registry has handed out every `u8` id.
    RegistryFull,
    /// A direct command argument failed validation.
    InvalidArgument(&'static str),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportTimeout => write!(f, "transport timeout"),
            Self::TransportBusy => write!(f, "transport busy"),
            Self::Transport => write!(f, "transport I/O error"),
            Self::ProtocolViolation => write!(f, "protocol violation"),
            Self::UnknownDevice => write!(f, "unknown device"),
            Self::QueueFull => write!(f, "queue full"),
            Self::AlreadyPending => write!(f, "request already pending"),
            Self::DuplicateRegistration => write!(f, "device already registered"),
            Self::RegistryFull => write!(f, "device registry full"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Gateway-wide `Result` alias.
pub type Result<T> = core::result::Result<T, GatewayError>;
