//! Application boundary.
//!
//! The gateway core (bridge, direct commands, telemetry) talks to the
//! outside world only through the **port traits** defined in [`ports`],
//! which keeps it testable on the host without peripherals.

pub mod ports;
