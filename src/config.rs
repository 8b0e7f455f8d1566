//! Gateway configuration parameters
//!
//! All tunable timings and capacities for the serial bridge and the report
//! pipeline.  Values can be overridden via NVS (see [`crate::adapters::nvs`]).

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Firmware version reported in the boot banner.
pub const FIRMWARE_VERSION: &str = "1.2.0";

/// Maximum bytes written to the serial link in one segment.
pub const SEGMENT_LEN: usize = 500;
/// Maximum length of a single received frame.
pub const MAX_FRAME_LEN: usize = 500;
/// Receive-side staging buffer for partially read frames.
pub const RX_BUFFER_LEN: usize = 1500;

/// Capacity of the raw telemetry message queue.
pub const REPORT_QUEUE_DEPTH: usize = 5;
/// Capacity of the resolved report entry queue drained by the flush task.
pub const WRITING_QUEUE_DEPTH: usize = 64;
/// Capacity of the reply chunk queue between the relay task and `/ans`.
pub const REPLY_QUEUE_DEPTH: usize = 40;

pub const DEFAULT_AP_SSID: &str = "Wetzel Lighting Control";
pub const DEFAULT_AP_PASSWORD: &str = "123456789";
/// SSID the mesh root uses before it has been provisioned.
pub const MESH_BOOTSTRAP_SSID: &str = "123456";

/// Core gateway configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    // --- Serial link ---
    /// UART baud rate towards the mesh root node
    pub uart_baud: u32,
    /// Window for the mesh to acknowledge a forwarded command
    pub ack_timeout_ms: u32,
    /// Bounded wait for the link mutex when starting a bridged request
    pub request_lock_wait_ms: u32,
    /// Total time the relay task may stream replies for one request
    pub relay_budget_ms: u32,
    /// Pause between consecutive 500-byte segments
    pub segment_gap_ms: u32,

    // --- Telemetry intake ---
    pub intake_lock_wait_ms: u32,
    pub intake_idle_ms: u32,
    pub intake_read_timeout_ms: u32,

    // --- Report pipeline ---
    /// Fallback wake-up of the consumer when no telemetry arrives
    pub consumer_poll_ms: u32,
    /// Fixed flush period for the day files
    pub flush_period_ms: u32,

    // --- Mesh status ---
    pub mesh_watch_period_ms: u32,

    // --- Surfaces ---
    pub http_port: u16,
    pub sd_mount_point: heapless::String<16>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let mut sd_mount_point = heapless::String::new();
        let _ = sd_mount_point.push_str("/sdcard");
        Self {
            // Serial link
            uart_baud: 230_400,
            ack_timeout_ms: 4000,
            request_lock_wait_ms: 1000,
            relay_budget_ms: 10_000,
            segment_gap_ms: 100,

            // Telemetry intake
            intake_lock_wait_ms: 50,
            intake_idle_ms: 50,
            intake_read_timeout_ms: 200,

            // Report pipeline
            consumer_poll_ms: 1000,
            flush_period_ms: 60_000, // 1/min

            mesh_watch_period_ms: 10_000,

            http_port: 80,
            sd_mount_point,
        }
    }
}

impl GatewayConfig {
    /// Range-check every field.  Invalid values are rejected, not clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(9_600..=921_600).contains(&self.uart_baud) {
            return Err(ConfigError::ValidationFailed("uart_baud must be 9600–921600"));
        }
        if self.ack_timeout_ms == 0 || self.request_lock_wait_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "ack_timeout_ms and request_lock_wait_ms must be non-zero",
            ));
        }
        if self.relay_budget_ms < self.ack_timeout_ms {
            return Err(ConfigError::ValidationFailed(
                "relay_budget_ms must be >= ack_timeout_ms",
            ));
        }
        if self.intake_lock_wait_ms == 0 || self.intake_idle_ms == 0 || self.intake_read_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("intake timings must be non-zero"));
        }
        if self.consumer_poll_ms == 0 {
            return Err(ConfigError::ValidationFailed("consumer_poll_ms must be non-zero"));
        }
        if !(1_000..=3_600_000).contains(&self.flush_period_ms) {
            return Err(ConfigError::ValidationFailed(
                "flush_period_ms must be 1000–3600000",
            ));
        }
        if self.mesh_watch_period_ms == 0 {
            return Err(ConfigError::ValidationFailed("mesh_watch_period_ms must be non-zero"));
        }
        if self.http_port == 0 {
            return Err(ConfigError::ValidationFailed("http_port must be non-zero"));
        }
        if !self.sd_mount_point.starts_with('/') {
            return Err(ConfigError::ValidationFailed("sd_mount_point must be absolute"));
        }
        Ok(())
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.ack_timeout_ms))
    }

    pub fn request_lock_wait(&self) -> Duration {
        Duration::from_millis(u64::from(self.request_lock_wait_ms))
    }

    pub fn relay_budget(&self) -> Duration {
        Duration::from_millis(u64::from(self.relay_budget_ms))
    }

    pub fn segment_gap(&self) -> Duration {
        Duration::from_millis(u64::from(self.segment_gap_ms))
    }

    pub fn intake_lock_wait(&self) -> Duration {
        Duration::from_millis(u64::from(self.intake_lock_wait_ms))
    }

    pub fn intake_idle(&self) -> Duration {
        Duration::from_millis(u64::from(self.intake_idle_ms))
    }

    pub fn intake_read_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.intake_read_timeout_ms))
    }

    pub fn consumer_poll(&self) -> Duration {
        Duration::from_millis(u64::from(self.consumer_poll_ms))
    }

    pub fn flush_period(&self) -> Duration {
        Duration::from_millis(u64::from(self.flush_period_ms))
    }

    pub fn mesh_watch_period(&self) -> Duration {
        Duration::from_millis(u64::from(self.mesh_watch_period_ms))
    }
}
