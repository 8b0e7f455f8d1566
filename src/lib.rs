//! Mesh gateway firmware library.
//!
//! Exposes the gateway core for integration testing and for the ESP-IDF
//! binary.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod bridge;
pub mod config;
pub mod diagnostics;
pub mod direct;
pub mod error;
pub mod http;
pub mod link;
pub mod mesh_watch;
pub mod tasks;
pub mod telemetry;

// Host builds get the simulation backends; the peripheral-bound adapters
// are gated inside the module.
pub mod adapters;
