//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements   | Connects to                    |
//! |----------------|--------------|--------------------------------|
//! | `clock`        | ClockPort    | ESP32 system time              |
//! | `http_server`  | (none)       | ESP-IDF httpd → [`crate::http`]|
//! | `nvs`          | ConfigPort   | NVS / in-memory store          |
//! |                | StoragePort  |                                |
//! | `sd_card`      | FileStore    | FAT on SPI SD card / any dir   |
//! | `uart`         | Transport    | UART2 to the mesh root node    |
//! | `wifi`         | WifiPort     | ESP-IDF soft-AP + STA          |

pub mod clock;
#[cfg(target_os = "espidf")]
pub mod http_server;
pub mod nvs;
pub mod sd_card;
#[cfg(target_os = "espidf")]
pub mod uart;
pub(super) mod utils;
pub mod wifi;
