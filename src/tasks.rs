//! Core-pinned thread spawning for the gateway tasks.
//!
//! Wraps `esp_pthread_set_cfg()` so that `std::thread::spawn` creates a
//! FreeRTOS task pinned to a specific CPU core with explicit priority
//! and stack size. On non-ESP targets, falls back to plain thread spawn.
//!
//! `esp_pthread_set_cfg()` sets thread-local configuration that applies to
//! the *next* `pthread_create()` call from the calling thread, so the
//! config→spawn pair must not be interleaved with other thread creation on
//! the same thread.

use std::io;
use std::thread::JoinHandle;

/// CPU core identifiers for the ESP32 dual-core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU): Wi-Fi, lwIP and the HTTP server.
    Pro = 0,
    /// Core 1 (APP_CPU): serial link and report pipeline.
    App = 1,
}

/// Priorities relative to the default application priority (6).
pub mod priority {
    pub const RELAY: u8 = 5;
    pub const REPORT_FLUSH: u8 = 5;
    pub const REPORT_CONSUMER: u8 = 4;
    pub const INTAKE: u8 = 4;
    pub const MESH_WATCH: u8 = 3;
}

/// Host threads get at least this much stack; debug builds need headroom.
#[cfg(not(target_os = "espidf"))]
const SIM_MIN_STACK_KB: usize = 64;

/// Spawn a thread pinned to a specific core with explicit priority and stack.
///
/// The `name` parameter must be a null-terminated string (e.g. `"relay\0"`).
#[cfg(target_os = "espidf")]
pub fn spawn_on_core(
    core: Core,
    priority: u8,
    stack_kb: usize,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    // SAFETY: the config struct is fully initialised by the IDF helper and
    // `name` is a 'static, NUL-terminated string.
    unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = core as i32;
        cfg.prio = priority as i32;
        cfg.stack_size = (stack_kb * 1024) as _;
        cfg.thread_name = name.as_ptr() as *const _;
        let ret = esp_idf_sys::esp_pthread_set_cfg(&cfg);
        if ret != esp_idf_sys::ESP_OK as i32 {
            return Err(io::Error::other(format!("esp_pthread_set_cfg failed: {ret}")));
        }
    }

    let display_name = name.trim_end_matches('\0');
    log::debug!(
        "Spawning '{}' on {:?} (pri={}, stack={}KB)",
        display_name,
        core,
        priority,
        stack_kb
    );

    std::thread::Builder::new()
        .name(display_name.into())
        .spawn(f)
}

/// Simulation fallback; ignores core affinity and priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_on_core(
    _core: Core,
    _priority: u8,
    stack_kb: usize,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    let display_name = name.trim_end_matches('\0');
    log::debug!(
        "Spawning '{}' (sim, no core pinning, stack={}KB)",
        display_name,
        stack_kb
    );

    std::thread::Builder::new()
        .name(display_name.into())
        .stack_size(stack_kb.max(SIM_MIN_STACK_KB) * 1024)
        .spawn(f)
}
