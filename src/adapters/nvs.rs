//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`ConfigPort`] for the gateway configuration and
//! [`StoragePort`] for the other blobs kept in flash:
//!
//! | namespace  | key        | contents                    |
//! |------------|------------|-----------------------------|
//! | `gateway`  | `config`   | [`GatewayConfig`] (postcard) |
//! | `registry` | `devices`  | report device registry       |
//! | `wifi`     | `settings` | Wi-Fi mode, AP and STA setup |
//!
//! ESP-IDF NVS commits are atomic per `nvs_commit()`.  The host backend is
//! an in-memory map.

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::GatewayConfig;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "gateway";
const CONFIG_KEY: &str = "config";

/// Largest blob read back from flash.
pub const MAX_BLOB_SIZE: usize = 4000;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Initialise NVS flash.  A full or outdated partition is erased and
    /// initialised again.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from main before any task touches NVS.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK || unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NVS: flash initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NVS: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// NUL-terminated copy of a namespace or key (NVS limit: 15 bytes).
    #[cfg(target_os = "espidf")]
    fn c_name(name: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let len = name.len().min(15);
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        buf
    }

    /// Open an NVS namespace, run `f` with the handle, then close it.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = Self::c_name(namespace);
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };
        let mut handle: nvs_handle_t = 0;
        // SAFETY: `ns` is NUL-terminated and outlives the call.
        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        let result = f(handle);
        // SAFETY: `handle` was opened above and is closed exactly once.
        unsafe { nvs_close(handle) };
        result
    }
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<GatewayConfig, ConfigError> {
        let mut buf = vec![0u8; MAX_BLOB_SIZE];
        match StoragePort::read(self, CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => {
                let cfg: GatewayConfig =
                    postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
                if let Err(e) = cfg.validate() {
                    warn!("NVS: stored config rejected ({}), using defaults", e);
                    return Ok(GatewayConfig::default());
                }
                info!("NVS: loaded config ({} bytes)", len);
                Ok(cfg)
            }
            Err(StorageError::NotFound) => {
                info!("NVS: no stored config, using defaults");
                Ok(GatewayConfig::default())
            }
            Err(e) => {
                warn!("NVS: config read failed ({}), using defaults", e);
                Ok(GatewayConfig::default())
            }
        }
    }

    fn save(&self, config: &GatewayConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        self.put(CONFIG_NAMESPACE, CONFIG_KEY, &bytes).map_err(|e| match e {
            StorageError::Full => ConfigError::StorageFull,
            _ => ConfigError::IoError,
        })?;
        info!("NVS: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl NvsAdapter {
    /// Blob write shared by [`ConfigPort::save`] (`&self`) and
    /// [`StoragePort::write`].
    fn put(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .insert(Self::composite_key(namespace, key), data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                // SAFETY: `key` is NUL-terminated; `data` is valid for its length.
                let ret = unsafe {
                    nvs_set_blob(handle, key.as_ptr() as *const _, data.as_ptr() as *const _, data.len())
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                // SAFETY: handle is open for writing.
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|e| {
                warn!("NVS: write {}/{} failed: {}", namespace, String::from_utf8_lossy(&key), e);
                if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                    StorageError::Full
                } else {
                    StorageError::IoError
                }
            })
        }
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            match self.store.borrow().get(&Self::composite_key(namespace, key)) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut size = buf.len();
                // SAFETY: `buf` is writable for `size` bytes.
                let ret = unsafe {
                    nvs_get_blob(handle, key.as_ptr() as *const _, buf.as_mut_ptr() as *mut _, &mut size)
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.put(namespace, key, data)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store.borrow_mut().remove(&Self::composite_key(namespace, key));
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                // SAFETY: `key` is NUL-terminated.
                let ret = unsafe { nvs_erase_key(handle, key.as_ptr() as *const _) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
                // SAFETY: handle is open for writing.
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store.borrow().contains_key(&Self::composite_key(namespace, key))
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            Self::with_nvs_handle(namespace, false, |handle| {
                // SAFETY: `key` is NUL-terminated; a null type pointer is allowed.
                let ret = unsafe { nvs_find_key(handle, key.as_ptr() as *const _, core::ptr::null_mut()) };
                Ok(ret == ESP_OK)
            })
            .unwrap_or(false)
        }
    }
}
