//! Runtime counters and periodic health logging.
//!
//! Every locally recovered condition (dropped telemetry, unknown devices,
//! protocol violations) increments a counter here instead of failing the
//! task that saw it.  The main loop logs a [`StatsSnapshot`] together with
//! the heap figures every few seconds.

use core::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct GatewayStats {
    http_requests: AtomicU32,
    acks_ok: AtomicU32,
    acks_not_ok: AtomicU32,
    ack_timeouts: AtomicU32,
    link_busy: AtomicU32,
    protocol_violations: AtomicU32,
    telemetry_accepted: AtomicU32,
    telemetry_dropped: AtomicU32,
    unknown_devices: AtomicU32,
    records_written: AtomicU32,
}

/// Point-in-time copy of [`GatewayStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub http_requests: u32,
    pub acks_ok: u32,
    pub acks_not_ok: u32,
    pub ack_timeouts: u32,
    pub link_busy: u32,
    pub protocol_violations: u32,
    pub telemetry_accepted: u32,
    pub telemetry_dropped: u32,
    pub unknown_devices: u32,
    pub records_written: u32,
}

fn bump(counter: &AtomicU32) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl GatewayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_http_request(&self) {
        bump(&self.http_requests);
    }

    pub fn record_ack_ok(&self) {
        bump(&self.acks_ok);
    }

    pub fn record_ack_not_ok(&self) {
        bump(&self.acks_not_ok);
    }

    pub fn record_ack_timeout(&self) {
        bump(&self.ack_timeouts);
    }

    pub fn record_link_busy(&self) {
        bump(&self.link_busy);
    }

    pub fn record_protocol_violation(&self) {
        bump(&self.protocol_violations);
    }

    pub fn record_telemetry_accepted(&self) {
        bump(&self.telemetry_accepted);
    }

    pub fn record_telemetry_dropped(&self) {
        bump(&self.telemetry_dropped);
    }

    pub fn record_unknown_device(&self) {
        bump(&self.unknown_devices);
    }

    pub fn record_records_written(&self, count: u32) {
        self.records_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU32| c.load(Ordering::Relaxed);
        StatsSnapshot {
            http_requests: get(&self.http_requests),
            acks_ok: get(&self.acks_ok),
            acks_not_ok: get(&self.acks_not_ok),
            ack_timeouts: get(&self.ack_timeouts),
            link_busy: get(&self.link_busy),
            protocol_violations: get(&self.protocol_violations),
            telemetry_accepted: get(&self.telemetry_accepted),
            telemetry_dropped: get(&self.telemetry_dropped),
            unknown_devices: get(&self.unknown_devices),
            records_written: get(&self.records_written),
        }
    }
}

/// Heap figures for the periodic health line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HeapInfo {
    pub free: u32,
    pub min_free: u32,
}

impl HeapInfo {
    #[cfg(target_os = "espidf")]
    pub fn collect() -> Self {
        use esp_idf_svc::sys::*;
        // SAFETY: read-only heap statistics, callable from any task.
        let free = unsafe { esp_get_free_heap_size() };
        let min_free = unsafe { esp_get_minimum_free_heap_size() };
        Self { free, min_free }
    }

    /// Simulation has no meaningful heap figures.
    #[cfg(not(target_os = "espidf"))]
    pub fn collect() -> Self {
        Self::default()
    }
}

/// Render one health line, e.g. for the main loop's periodic log.
pub fn health_line(stats: &StatsSnapshot, heap: &HeapInfo) -> String {
    let stats = serde_json::to_string(stats).unwrap_or_default();
    format!("heap_free={} heap_min={} stats={}", heap.free, heap.min_free, stats)
}
