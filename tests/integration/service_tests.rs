//! Integration tests for boot-time configuration handling.
//!
//! Covers the persisted [`SystemConfig`] (validation, round-trip through
//! the storage adapter) and what [`DeviceService`] derives from the field
//! set for the sync worker and the WiFi station.

use camsync::adapters::nvs::NvsAdapter;
use camsync::app::events::AppEvent;
use camsync::app::ports::{ConfigError, ConfigPort, StoragePort};
use camsync::app::service::{DeviceService, STORE_KEY, STORE_NAMESPACE};
use camsync::config::SystemConfig;
use camsync::provision::{ConfigStore, FieldId};

use crate::mock_device::RecordingSink;

// ── SystemConfig persistence ──────────────────────────────────

#[test]
fn missing_config_loads_defaults() {
    let nvs = NvsAdapter::new().unwrap();
    assert_eq!(nvs.load().unwrap(), SystemConfig::default());
}

#[test]
fn saved_config_round_trips() {
    let nvs = NvsAdapter::new().unwrap();
    let mut cfg = SystemConfig::default();
    cfg.stream_period_ms = 250;
    cfg.default_host = heapless::String::try_from("https://cams.example").unwrap();

    nvs.save(&cfg).unwrap();

    assert_eq!(nvs.load().unwrap(), cfg);
}

#[test]
fn invalid_config_is_not_persisted() {
    let nvs = NvsAdapter::new().unwrap();
    let mut cfg = SystemConfig::default();
    cfg.stream_period_ms = 10; // below the scheduler tick

    assert!(matches!(nvs.save(&cfg), Err(ConfigError::ValidationFailed(_))));
    assert_eq!(nvs.load().unwrap(), SystemConfig::default());
}

// ── Field set persistence ─────────────────────────────────────

#[test]
fn unchanged_store_is_not_rewritten() {
    let mut nvs = NvsAdapter::new().unwrap();
    let mut sink = RecordingSink::new();
    let mut service = DeviceService::new(SystemConfig::default());

    let store = service.load_store(&nvs);
    assert_eq!(service.save_if_changed(&store, &mut nvs, &mut sink), Ok(false));
    assert!(sink.events.is_empty());
}

#[test]
fn changed_store_is_written_once() {
    let mut nvs = NvsAdapter::new().unwrap();
    let mut sink = RecordingSink::new();
    let mut service = DeviceService::new(SystemConfig::default());

    let mut store = service.load_store(&nvs);
    store.set_field(FieldId::Host, "https://cams.example");

    assert_eq!(service.save_if_changed(&store, &mut nvs, &mut sink), Ok(true));
    assert_eq!(service.save_if_changed(&store, &mut nvs, &mut sink), Ok(false));
    assert_eq!(sink.events, vec![AppEvent::ConfigSaved]);
}

#[test]
fn corrupt_stored_field_set_falls_back_to_defaults() {
    let mut nvs = NvsAdapter::new().unwrap();
    nvs.write(STORE_NAMESPACE, STORE_KEY, b"{not json").unwrap();

    let mut service = DeviceService::new(SystemConfig::default());
    let store = service.load_store(&nvs);

    assert_eq!(store.get(FieldId::User), "");
    assert_eq!(store.get(FieldId::DeviceName), "esp32-cam");
}

// ── Derived views ─────────────────────────────────────────────

#[test]
fn identity_uses_store_then_defaults() {
    let mut cfg = SystemConfig::default();
    cfg.device_meta = heapless::String::try_from("lab-bench").unwrap();
    let service = DeviceService::new(cfg);

    let mut store = ConfigStore::from_persisted(b"", "esp32-cam");
    store.set_field(FieldId::User, "alice");
    store.set_field(FieldId::Password, "pw");

    let id = service.identity(&store);
    assert_eq!(id.host, "https://localhost:8080");
    assert_eq!(id.user, "alice");
    assert_eq!(id.password, "pw");
    assert_eq!(id.device, "esp32-cam");
    assert_eq!(id.meta.as_deref(), Some("lab-bench"));

    store.set_field(FieldId::Host, "https://cams.example");
    assert_eq!(service.identity(&store).host, "https://cams.example");
}

#[test]
fn credentials_need_a_network_id() {
    let service = DeviceService::new(SystemConfig::default());
    let mut store = ConfigStore::new();
    assert!(service.network_credentials(&store).is_none());

    store.set_field(FieldId::NetworkId, "home-net");
    let (ssid, pass) = service.network_credentials(&store).unwrap();
    assert_eq!(ssid.as_str(), "home-net");
    assert!(pass.is_empty(), "open network");

    store.set_field(FieldId::NetworkId, &"x".repeat(40));
    assert!(service.network_credentials(&store).is_none(), "SSID longer than 32 bytes");
}
