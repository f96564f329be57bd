//! Integration tests for the short-range configuration exchange.
//!
//! A simulated central drives [`BleAdapter`]: it subscribes, pulls the
//! paged disclosure one acknowledgment at a time, and writes commands with
//! prepared (long) writes.  The round window and persistence through
//! [`DeviceService`] are exercised on the same channel.

use camsync::adapters::ble::{BleAdapter, ConfigAccessPort};
use camsync::adapters::nvs::NvsAdapter;
use camsync::app::service::DeviceService;
use camsync::config::SystemConfig;
use camsync::events::Event;
use camsync::provision::channel::{CCC_DISABLE, CCC_NOTIFY_ENABLE};
use camsync::provision::store::PAGE_LEN;
use camsync::provision::{ChannelAction, ConfigChannel, ConfigRound, ConfigStore, FieldId};

use crate::mock_device::RecordingSink;

fn connected_adapter(store: ConfigStore) -> BleAdapter {
    let mut ble = BleAdapter::new("cam-test", ConfigChannel::new(store).into_shared());
    ble.start().unwrap();
    ble.on_central_connected();
    ble
}

/// Pull pages until the pager runs dry, acknowledging each one.
fn pull_all(ble: &mut BleAdapter) -> Vec<u8> {
    let mut blob = Vec::new();
    while ble.pump_notify().is_some() {
        ble.on_confirm();
    }
    for page in ble.take_notified() {
        assert_eq!(page.last(), Some(&0), "every page is NUL-terminated");
        assert!(page.len() <= PAGE_LEN + 1);
        blob.extend_from_slice(&page[..page.len() - 1]);
    }
    blob
}

/// Send `command` as prepared writes of `piece` bytes, then execute.
fn long_write(ble: &mut BleAdapter, command: &[u8], piece: usize) -> ChannelAction {
    for (i, part) in command.chunks(piece).enumerate() {
        ble.on_command_prepare(i * piece, part).unwrap();
    }
    ble.on_command_execute(true).unwrap()
}

fn store_with_user() -> ConfigStore {
    let mut store = ConfigStore::from_persisted(b"", "cam-test");
    store.set_field(FieldId::User, "alice");
    store
}

// ── Disclosure ────────────────────────────────────────────────

#[test]
fn subscriber_receives_full_disclosure() {
    let mut ble = connected_adapter(store_with_user());
    assert_eq!(ble.pump_notify(), None, "nothing before subscription");

    ble.on_descriptor_write(CCC_NOTIFY_ENABLE);
    let blob = pull_all(&mut ble);

    assert_eq!(
        blob,
        b"{\"u\":\"alice\"}\r\n{\"p\":\"\"}\r\n{\"h\":\"\"}\r\n{\"s\":\"\"}\r\n{\"k\":\"\"}\r\n{\"d\":\"cam-test\"}\r\n"
    );
    assert_eq!(ble.pages_sent(), blob.len().div_ceil(PAGE_LEN));
}

#[test]
fn written_secrets_are_never_disclosed() {
    let mut ble = connected_adapter(store_with_user());
    assert_eq!(
        long_write(&mut ble, br#"*set*{"p":"secret"}"#, 8),
        ChannelAction::Updated(FieldId::Password)
    );
    assert_eq!(
        long_write(&mut ble, br#"*set*{"k":"wifi-pass"}"#, 8),
        ChannelAction::Updated(FieldId::NetworkSecret)
    );

    ble.on_descriptor_write(CCC_NOTIFY_ENABLE);
    let blob = String::from_utf8(pull_all(&mut ble)).unwrap();

    assert!(blob.starts_with("{\"u\":\"alice\"}\r\n{\"p\":\"\"}\r\n"));
    assert!(!blob.contains("secret"));
    assert!(!blob.contains("wifi-pass"));

    let channel = ConfigChannel::lock(ble.channel());
    assert_eq!(channel.store().get(FieldId::Password), "secret");
    assert_eq!(channel.store().get(FieldId::NetworkSecret), "wifi-pass");
}

#[test]
fn device_name_cannot_be_overwritten() {
    let mut ble = connected_adapter(store_with_user());
    assert_eq!(
        ble.on_command_write(0, br#"*set*{"d":"evil"}"#).unwrap(),
        ChannelAction::Ignored
    );
    let channel = ConfigChannel::lock(ble.channel());
    assert_eq!(channel.store().get(FieldId::DeviceName), "cam-test");
    assert!(!channel.is_changed());
}

#[test]
fn get_restarts_disclosure_mid_pass() {
    let mut ble = connected_adapter(store_with_user());
    ble.on_descriptor_write(CCC_NOTIFY_ENABLE);
    assert!(ble.pump_notify().is_some());
    ble.on_confirm();
    assert!(ble.pump_notify().is_some());
    ble.on_confirm();
    let first_two = ble.take_notified();

    assert_eq!(ble.on_command_write(0, b"*get*").unwrap(), ChannelAction::Restarted);
    assert!(ble.pump_notify().is_some());
    let again = ble.take_notified();
    assert_eq!(again[0], first_two[0]);
}

#[test]
fn update_mid_pass_is_reflected_in_next_pass() {
    let mut ble = connected_adapter(store_with_user());
    ble.on_descriptor_write(CCC_NOTIFY_ENABLE);
    let before = pull_all(&mut ble);

    long_write(&mut ble, br#"*set*{"h":"https://srv.example"}"#, 12);
    ble.on_descriptor_write(CCC_NOTIFY_ENABLE);
    let after = String::from_utf8(pull_all(&mut ble)).unwrap();

    assert!(after.contains("{\"h\":\"https://srv.example\"}\r\n"));
    assert_eq!(after.len(), before.len() + "https://srv.example".len());
}

#[test]
fn cancelled_write_leaves_store_untouched() {
    let mut ble = connected_adapter(store_with_user());
    ble.on_command_prepare(0, br#"*set*{"u":"#).unwrap();
    ble.on_command_prepare(10, br#""mallory"}"#).unwrap();
    assert_eq!(ble.on_command_execute(false).unwrap(), ChannelAction::Ignored);

    let channel = ConfigChannel::lock(ble.channel());
    assert_eq!(channel.store().get(FieldId::User), "alice");
}

#[test]
fn rejected_piece_keeps_earlier_pieces() {
    let mut ble = connected_adapter(store_with_user());
    ble.on_command_prepare(0, br#"*set*{"u":"bob"}"#).unwrap();
    assert!(ble.on_command_prepare(200, b"x").is_err());
    assert_eq!(
        ble.on_command_execute(true).unwrap(),
        ChannelAction::Updated(FieldId::User)
    );
}

#[test]
fn unsubscribe_stops_the_pager() {
    let mut ble = connected_adapter(store_with_user());
    ble.on_descriptor_write(CCC_NOTIFY_ENABLE);
    assert!(ble.pump_notify().is_some());
    ble.on_descriptor_write(CCC_DISABLE);
    ble.on_confirm();
    assert_eq!(ble.pump_notify(), None);
}

// ── Round window ──────────────────────────────────────────────

#[test]
fn exit_command_ends_the_round() {
    let mut round = ConfigRound::new();
    round.start(0);
    let mut ble = connected_adapter(store_with_user());
    assert!(round.on_event(Event::ConfigPeerConnected, 100));

    let action = ble.on_command_write(0, b"*cmd*exit").unwrap();
    assert_eq!(action, ChannelAction::ExitRequested);
    assert!(round.on_event(Event::ConfigExitRequested, 200));

    assert!(!round.is_active(201));
    ble.stop();
    assert!(!ble.is_active());
}

#[test]
fn peer_session_holds_the_window_open() {
    let mut round = ConfigRound::new();
    round.start(0);
    round.on_event(Event::ConfigPeerConnected, 29_000);
    assert!(round.is_active(120_000));
    round.on_event(Event::ConfigPeerDisconnected, 120_000);
    assert!(round.is_active(129_999));
    assert!(!round.is_active(130_000));
    assert!(!round.on_event(Event::ButtonPressed(0), 130_000));
}

// ── Persistence ───────────────────────────────────────────────

#[test]
fn edited_fields_survive_a_reboot() {
    let config = SystemConfig::default();
    let mut nvs = NvsAdapter::new().unwrap();
    let mut sink = RecordingSink::new();

    let mut service = DeviceService::new(config.clone());
    let store = service.load_store(&nvs);
    let mut ble = connected_adapter(store);
    long_write(&mut ble, br#"*set*{"s":"home-net"}"#, 10);
    long_write(&mut ble, br#"*set*{"k":"hunter22"}"#, 10);
    long_write(&mut ble, br#"*set*{"u":"alice"}"#, 10);
    ble.stop();

    let edited = ConfigChannel::lock(ble.channel()).store().clone();
    assert_eq!(service.save_if_changed(&edited, &mut nvs, &mut sink), Ok(true));
    assert_eq!(service.save_if_changed(&edited, &mut nvs, &mut sink), Ok(false));

    let mut rebooted = DeviceService::new(config);
    let store = rebooted.load_store(&nvs);
    assert_eq!(store.get(FieldId::User), "alice");
    assert_eq!(store.get(FieldId::NetworkSecret), "hunter22");
    assert_eq!(store.get(FieldId::DeviceName), "esp32-cam");

    let (ssid, pass) = rebooted.network_credentials(&store).unwrap();
    assert_eq!(ssid.as_str(), "home-net");
    assert_eq!(pass.as_str(), "hunter22");
}
