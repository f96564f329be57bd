//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`].
//!
//! # Security
//!
//! - Config validation: every policy field is range-checked before persistence.
//! - The configuration field set (credentials included) lives in the
//!   `camsync` namespace; enable NVS encryption in production builds.
//! - Atomic writes: ESP-IDF NVS commits are atomic per nvs_commit().

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::app::service::STORE_NAMESPACE;
use crate::config::SystemConfig;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_KEY: &str = "syscfg";

#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const MAX_BLOB_SIZE: usize = 4000;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the NVS partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NvsAdapter: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// NUL-terminated copy of an NVS name (max 15 chars).
    #[cfg(target_os = "espidf")]
    fn c_name(name: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let len = name.len().min(15);
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        buf
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = Self::c_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }
}

fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigError> {
    if cfg.default_host.is_empty() {
        return Err(ConfigError::ValidationFailed("default_host must not be empty"));
    }
    if cfg.device_name.is_empty() {
        return Err(ConfigError::ValidationFailed("device_name must not be empty"));
    }
    if !(10..=1000).contains(&cfg.scheduler_tick_ms) {
        return Err(ConfigError::ValidationFailed("scheduler_tick_ms must be 10–1000"));
    }
    for period in [
        cfg.get_msgs_period_ms,
        cfg.send_msgs_period_ms,
        cfg.stream_period_ms,
        cfg.probe_period_ms,
    ] {
        if period < cfg.scheduler_tick_ms || period > 3_600_000 {
            return Err(ConfigError::ValidationFailed(
                "task periods must be between scheduler_tick_ms and one hour",
            ));
        }
    }
    if cfg.incoming_batch == 0 {
        return Err(ConfigError::ValidationFailed("incoming_batch must be at least 1"));
    }
    if cfg.max_protocol_errors == 0 {
        return Err(ConfigError::ValidationFailed("max_protocol_errors must be at least 1"));
    }
    if cfg.max_backoff_ms == 0 || cfg.max_backoff_ms > 600_000 {
        return Err(ConfigError::ValidationFailed("max_backoff_ms must be 1–600000"));
    }
    if cfg.response_initial_bytes == 0 || cfg.response_initial_bytes > cfg.response_max_bytes {
        return Err(ConfigError::ValidationFailed(
            "response_initial_bytes must be 1..=response_max_bytes",
        ));
    }
    if cfg.stream_stall_limit == 0 {
        return Err(ConfigError::ValidationFailed("stream_stall_limit must be at least 1"));
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let mut buf = vec![0u8; MAX_BLOB_SIZE];
        match self.read(STORE_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(n) => {
                let cfg: SystemConfig =
                    postcard::from_bytes(&buf[..n]).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsAdapter: loaded config ({} bytes)", n);
                Ok(cfg)
            }
            Err(StorageError::NotFound) => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
            Err(e) => {
                warn!("NvsAdapter: config read error ({}), using defaults", e);
                Ok(SystemConfig::default())
            }
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(STORE_NAMESPACE, CONFIG_KEY);
            self.store.borrow_mut().insert(key, bytes);
            info!("NvsAdapter: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(CONFIG_KEY);
            let result = Self::with_nvs_handle(STORE_NAMESPACE, true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(handle, key.as_ptr() as *const _, bytes.as_ptr() as *const _, bytes.len())
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: config saved to NVS ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE => Err(ConfigError::StorageFull),
                Err(e) => {
                    warn!("NvsAdapter: NVS write error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            match self.store.borrow().get(&composite) {
                Some(data) if data.len() > buf.len() => Err(StorageError::BufferTooSmall),
                Some(data) => {
                    buf[..data.len()].copy_from_slice(data);
                    Ok(data.len())
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut size = buf.len();
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
                Err(e) if e == ESP_ERR_NVS_INVALID_LENGTH => Err(StorageError::BufferTooSmall),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(handle, key.as_ptr() as *const _, data.as_ptr() as *const _, data.len())
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|e| {
                if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                    StorageError::Full
                } else {
                    StorageError::IoError
                }
            })
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().remove(&composite);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let ret = unsafe { nvs_erase_key(handle, key.as_ptr() as *const _) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
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
            let composite = Self::composite_key(namespace, key);
            self.store.borrow().contains_key(&composite)
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let ret = unsafe {
                    nvs_find_key(handle, key.as_ptr() as *const _, core::ptr::null_mut())
                };
                Ok(ret == ESP_OK)
            });
            result.unwrap_or(false)
        }
    }
}
