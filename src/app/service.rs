//! Device service: glue between the field set, storage and the engine.
//!
//! [`DeviceService`] loads the configuration field set at boot, derives the
//! server identity and WiFi credentials from it, and writes it back when a
//! configuration round changed something.  All I/O flows through port
//! traits injected at call sites.
//!
//! ```text
//!  StoragePort ──▶ ┌────────────────────────┐ ──▶ Identity (SyncEngine)
//!                  │     DeviceService      │
//!  ConfigStore ◀──▶│  load · save · derive  │ ──▶ WiFi credentials
//!                  └────────────────────────┘
//! ```

use log::{info, warn};

use super::events::AppEvent;
use super::ports::{EventSink, StorageError, StoragePort};
use crate::config::SystemConfig;
use crate::provision::{ConfigStore, FieldId};
use crate::sync::Identity;

/// NVS namespace shared by everything this firmware persists.
pub const STORE_NAMESPACE: &str = "camsync";
/// Key of the persisted field set.
pub const STORE_KEY: &str = "json_cfg";

const MAX_STORE_BYTES: usize = 1024;

pub struct DeviceService {
    config: SystemConfig,
    /// Stored form as last loaded or saved.
    persisted: Vec<u8>,
}

impl DeviceService {
    pub fn new(config: SystemConfig) -> Self {
        Self {
            config,
            persisted: Vec::new(),
        }
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    // ── Persistence ───────────────────────────────────────────

    /// Load the field set, falling back to defaults.
    pub fn load_store(&mut self, storage: &impl StoragePort) -> ConfigStore {
        let mut buf = [0u8; MAX_STORE_BYTES];
        let stored = match storage.read(STORE_NAMESPACE, STORE_KEY, &mut buf) {
            Ok(n) => &buf[..n],
            Err(StorageError::NotFound) => {
                info!("DeviceService: no stored field set, using defaults");
                &[][..]
            }
            Err(e) => {
                warn!("DeviceService: field set read failed: {}", e);
                &[][..]
            }
        };
        let store = ConfigStore::from_persisted(stored, self.config.device_name.as_str());
        self.persisted = store.to_persisted();
        store
    }

    /// Persist `store` if it differs from what storage holds.
    /// Returns whether a write happened.
    pub fn save_if_changed(
        &mut self,
        store: &ConfigStore,
        storage: &mut impl StoragePort,
        sink: &mut impl EventSink,
    ) -> Result<bool, StorageError> {
        let bytes = store.to_persisted();
        if bytes == self.persisted {
            return Ok(false);
        }
        storage.write(STORE_NAMESPACE, STORE_KEY, &bytes)?;
        self.persisted = bytes;
        sink.emit(&AppEvent::ConfigSaved);
        Ok(true)
    }

    // ── Derived views ─────────────────────────────────────────

    /// Server identity; empty host and device fall back to the defaults.
    pub fn identity(&self, store: &ConfigStore) -> Identity {
        let or_default = |v: &str, d: &str| if v.is_empty() { d.to_owned() } else { v.to_owned() };
        Identity {
            host: or_default(store.get(FieldId::Host), self.config.default_host.as_str()),
            user: store.get(FieldId::User).to_owned(),
            password: store.get(FieldId::Password).to_owned(),
            device: or_default(store.get(FieldId::DeviceName), self.config.device_name.as_str()),
            meta: Some(self.config.device_meta.as_str())
                .filter(|m| !m.is_empty())
                .map(str::to_owned),
        }
    }

    /// WiFi station credentials, if a network id is configured and fits.
    pub fn network_credentials(
        &self,
        store: &ConfigStore,
    ) -> Option<(heapless::String<32>, heapless::String<64>)> {
        let ssid = store.get(FieldId::NetworkId);
        if ssid.is_empty() {
            return None;
        }
        let ssid = heapless::String::try_from(ssid).ok()?;
        let pass = heapless::String::try_from(store.get(FieldId::NetworkSecret)).ok()?;
        Some((ssid, pass))
    }
}
