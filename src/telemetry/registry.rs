//! Device registry: MAC address → luminaire record.
//!
//! Ids are handed out densely in registration order (`id = size before
//! insert`), so they double as compact keys in the day-file records.  A MAC
//! can only be registered once; re-registration is rejected without touching
//! the stored record.

use std::collections::BTreeMap;

use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::app::ports::{StorageError, StoragePort};
use crate::error::{GatewayError, Result};

pub type MacAddress = [u8; 6];

/// Ids are `u8`, so at most 256 devices.
pub const MAX_DEVICES: usize = 256;

const REGISTRY_NAMESPACE: &str = "registry";
const REGISTRY_KEY: &str = "devices";
const REGISTRY_BLOB_MAX: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LuminaireModel {
    Lum17k = 0,
    Lum23k = 1,
    Lum32k = 2,
}

impl LuminaireModel {
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Lum17k),
            1 => Some(Self::Lum23k),
            2 => Some(Self::Lum32k),
            _ => None,
        }
    }

    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Rated power at full duty.
    pub const fn watts(self) -> u32 {
        match self {
            Self::Lum17k => 120,
            Self::Lum23k => 160,
            Self::Lum32k => 220,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub mac: MacAddress,
    pub id: u8,
    pub unit_count: u8,
    pub model: LuminaireModel,
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Mutex<BTreeMap<MacAddress, DeviceRecord>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        mac: MacAddress,
        unit_count: u8,
        model: LuminaireModel,
    ) -> Result<DeviceRecord> {
        let mut devices = self.devices.lock();
        if devices.contains_key(&mac) {
            warn!("Registry: {} already registered", format_mac(&mac));
            return Err(GatewayError::DuplicateRegistration);
        }
        if devices.len() >= MAX_DEVICES {
            warn!("Registry: full, {} rejected", format_mac(&mac));
            return Err(GatewayError::RegistryFull);
        }
        let record = DeviceRecord {
            mac,
            id: devices.len() as u8,
            unit_count,
            model,
        };
        devices.insert(mac, record);
        info!(
            "Registry: {} -> id {} ({} x {:?})",
            format_mac(&mac),
            record.id,
            unit_count,
            model
        );
        Ok(record)
    }

    pub fn lookup(&self, mac: &MacAddress) -> Option<DeviceRecord> {
        self.devices.lock().get(mac).copied()
    }

    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }

    /// All records ordered by id.
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<_> = self.devices.lock().values().copied().collect();
        records.sort_by_key(|r| r.id);
        records
    }

    /// Persist the registry as one postcard blob.
    pub fn save(&self, store: &mut dyn StoragePort) -> core::result::Result<(), StorageError> {
        let bytes = postcard::to_allocvec(&self.snapshot()).map_err(|_| StorageError::IoError)?;
        if bytes.len() > REGISTRY_BLOB_MAX {
            return Err(StorageError::Full);
        }
        store.write(REGISTRY_NAMESPACE, REGISTRY_KEY, &bytes)
    }

    /// Restore a registry saved with [`save`](Self::save).  A missing or
    /// corrupt blob yields an empty registry.
    pub fn load(store: &dyn StoragePort) -> Self {
        let mut buf = vec![0u8; REGISTRY_BLOB_MAX];
        let records: Vec<DeviceRecord> = match store.read(REGISTRY_NAMESPACE, REGISTRY_KEY, &mut buf) {
            Ok(len) => match postcard::from_bytes(&buf[..len]) {
                Ok(records) => records,
                Err(_) => {
                    warn!("Registry: stored blob corrupted, starting empty");
                    Vec::new()
                }
            },
            Err(StorageError::NotFound) => Vec::new(),
            Err(e) => {
                warn!("Registry: load failed ({}), starting empty", e);
                Vec::new()
            }
        };

        let registry = Self::new();
        {
            let mut devices = registry.devices.lock();
            for record in records {
                devices.insert(record.mac, record);
            }
        }
        info!("Registry: restored {} devices", registry.len());
        registry
    }
}

/// Parse twelve hex digits (`"AABBCCDDEEFF"`) into a MAC address.
pub fn parse_mac(text: &str) -> Option<MacAddress> {
    let text = text.trim();
    if text.len() != 12 {
        return None;
    }
    let mut mac = [0u8; 6];
    hex::decode_to_slice(text, &mut mac).ok()?;
    Some(mac)
}

pub fn format_mac(mac: &MacAddress) -> String {
    mac.iter().map(|b| format!("{:02X}", b)).collect()
}
