//! Port traits: the hexagonal boundary between the gateway core and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ bridge / direct / telemetry (domain)
//! ```
//!
//! Driven adapters (clock, SD card, NVS, Wi-Fi) implement these traits.
//! The serial transport port lives in [`crate::link::transport`] because the
//! link owns its framing.
//!
//! ## Notes
//!
//! - **ConfigPort** implementations MUST validate before persisting.
//! - **FileStore** writers close their file when dropped.
//! - All port errors are typed; callers must handle every variant explicitly.

use crate::config::GatewayConfig;

// ───────────────────────────────────────────────────────────────
// Clock port (real-time clock)
// ───────────────────────────────────────────────────────────────

/// Wall-clock source used to stamp report entries and name day files.
pub trait ClockPort: Send + Sync {
    /// Current time in unix seconds.
    fn now(&self) -> u32;

    /// Set the wall clock (direct command 7).
    fn set(&self, unix_seconds: u32) -> Result<(), ClockError>;
}

// ───────────────────────────────────────────────────────────────
// File store port (SD card day files)
// ───────────────────────────────────────────────────────────────

/// Append-only file access for the report day files.
pub trait FileStore: Send + Sync {
    /// Open `name` for appending, creating it if needed.  Dropping the
    /// returned writer closes the file.
    fn open_append(&self, name: &str) -> Result<Box<dyn std::io::Write + Send>, StorageError>;

    /// Read a whole file.  Missing files yield [`StorageError::NotFound`].
    fn read(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Current size of `name` in bytes.
    fn size(&self, name: &str) -> Result<u64, StorageError>;

    /// Cut `name` back to `len` bytes, discarding a partly written tail.
    fn truncate(&self, name: &str, len: u64) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Telemetry sink (intake side of the report pipeline)
// ───────────────────────────────────────────────────────────────

/// Accepts the payload of a `#` telemetry frame (header already stripped).
///
/// Called from every task that reads the serial link, so a telemetry frame
/// that shows up in the middle of a command exchange is never lost to the
/// reply stream.
pub trait TelemetrySink: Send + Sync {
    fn offer(&self, payload: &[u8]) -> crate::error::Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists gateway configuration.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`GatewayConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<GatewayConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &GatewayConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for the registry and Wi-Fi settings.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic: no partial writes on power loss.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Wi-Fi port (soft-AP + station)
// ───────────────────────────────────────────────────────────────

/// Radio operating mode.  The gateway always runs its own access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WifiMode {
    Ap,
    ApSta,
}

impl WifiMode {
    /// ESP-IDF `wifi_mode_t` numbering, as reported by the interface-info command.
    pub const fn code(self) -> u8 {
        match self {
            Self::Ap => 2,
            Self::ApSta => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ApSettings {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

/// Static IPv4 settings for the station interface.  Octets are stored raw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Ipv4Settings {
    pub ip: [u8; 4],
    pub mask: [u8; 4],
    pub gateway: [u8; 4],
    pub dns1: [u8; 4],
    pub dns2: [u8; 4],
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StaSettings {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
    /// `None` means DHCP.
    pub ipv4: Option<Ipv4Settings>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub ssid: heapless::String<32>,
    pub rssi: i8,
}

pub const MAX_SCAN_ENTRIES: usize = 16;

pub trait WifiPort: Send {
    fn mode(&self) -> WifiMode;

    /// Stop the radio, apply the stored settings for `mode`, start again.
    fn restart(&mut self, mode: WifiMode) -> Result<(), WifiError>;

    fn ap_settings(&self) -> ApSettings;
    fn set_ap_settings(&mut self, ssid: &str, password: &str) -> Result<(), WifiError>;

    fn sta_settings(&self) -> StaSettings;
    fn set_sta_credentials(&mut self, ssid: &str, password: &str) -> Result<(), WifiError>;
    fn set_sta_ipv4(&mut self, ipv4: Option<Ipv4Settings>) -> Result<(), WifiError>;

    /// Addresses currently in effect on the station interface.
    fn ipv4_info(&self) -> Ipv4Settings;

    fn scan(&mut self) -> Result<heapless::Vec<ScanEntry, MAX_SCAN_ENTRIES>, WifiError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] and [`FileStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key or file does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    /// Refused to set a time before 2020-01-01.
    Implausible,
    /// The platform rejected the update.
    SetFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiError {
    InvalidSsid,
    InvalidPassword,
    InvalidAddress,
    RestartFailed,
    ScanFailed,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for ClockError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Implausible => write!(f, "timestamp before 2020-01-01"),
            Self::SetFailed => write!(f, "settimeofday failed"),
        }
    }
}

impl core::fmt::Display for WifiError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 8-64 bytes, or empty for open)"),
            Self::InvalidAddress => write!(f, "invalid IPv4 address"),
            Self::RestartFailed => write!(f, "Wi-Fi restart failed"),
            Self::ScanFailed => write!(f, "Wi-Fi scan failed"),
        }
    }
}
