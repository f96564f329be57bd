//! camsync firmware: main entry point.
//!
//! Boot runs a short BLE configuration round, persists any changes, joins
//! WiFi and then hands the board to the sync worker.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  BleAdapter        WifiAdapter     NvsAdapter    LogEventSink  │
//! │  (ConfigAccess)    (Connectivity)  (Config+NVS)  (EventSink)   │
//! │  HttpAdapter       CameraAdapter   BoardAdapter                │
//! │  (Exchange+Stream) (CameraPort)    (BoardPort+DelayNs)         │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  ConfigRound · ConfigChannel      DeviceService        │    │
//! │  │  SyncEngine (worker) ◀── SyncHandle ◀── timer task     │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use embedded_hal::delay::DelayNs;
use esp_idf_hal::gpio::{OutputPin as _, PinDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{error, info, warn};

use camsync::adapters::ble::{BleAdapter, ConfigAccessPort};
use camsync::adapters::board::BoardAdapter;
use camsync::adapters::camera::CameraAdapter;
use camsync::adapters::device::Device;
use camsync::adapters::http::HttpAdapter;
use camsync::adapters::log_sink::LogEventSink;
use camsync::adapters::nvs::NvsAdapter;
use camsync::adapters::time::Clock;
use camsync::adapters::wifi::{ConnectivityPort, WifiAdapter};
use camsync::app::ports::ConfigPort;
use camsync::app::service::DeviceService;
use camsync::config::SystemConfig;
use camsync::drivers::hw_init;
use camsync::events::{self, Event};
use camsync::pins;
use camsync::provision::channel::NOTIFY_PERIOD_MS;
use camsync::provision::{ConfigChannel, ConfigRound, ConfigStore};
use camsync::scheduler::Scheduler;
use camsync::sync::{SyncEngine, SyncHandle, timer_task};

// ── Configuration round ───────────────────────────────────────

/// Advertise the config service until the round ends; returns the
/// (possibly edited) field set.
fn run_config_round(store: ConfigStore, device_name: &str, clock: &Clock, board: &mut impl DelayNs) -> ConfigStore {
    let channel = ConfigChannel::new(store).into_shared();
    let mut ble = BleAdapter::new(device_name, channel.clone());
    let mut round = ConfigRound::new();

    match ble.start() {
        Ok(()) => round.start(clock.uptime_ms()),
        Err(e) => warn!("Config round skipped: {}", e),
    }

    while round.is_active(clock.uptime_ms()) {
        events::drain_events(|event| {
            round.on_event(event, clock.uptime_ms());
        });
        ble.pump_notify();
        board.delay_ms(NOTIFY_PERIOD_MS);
    }
    ble.stop();

    let ch = ConfigChannel::lock(&channel);
    if ch.is_changed() {
        info!("Config round: fields updated by peer");
    }
    ch.store().clone()
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  camsync v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    if let Err(e) = hw_init::init_peripherals() {
        error!("HAL init failed: {}, buttons and probe unavailable", e);
    }

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let mut nvs = NvsAdapter::new().map_err(|e| anyhow::anyhow!("NVS init failed: {}", e))?;
    let config = match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };

    // ── 3. Board outputs ──────────────────────────────────────
    let pins_in = peripherals.pins;
    let mut board = BoardAdapter::new()
        .with_output(pins::FLASH_LED_GPIO, PinDriver::output(pins_in.gpio4.downgrade_output())?, false)
        .with_output(pins::STATUS_LED_GPIO, PinDriver::output(pins_in.gpio33.downgrade_output())?, true)
        .with_output(pins::OUT1_GPIO, PinDriver::output(pins_in.gpio2.downgrade_output())?, false)
        .with_output(pins::OUT2_GPIO, PinDriver::output(pins_in.gpio14.downgrade_output())?, false);

    // ── 4. Configuration round (BLE) ──────────────────────────
    let clock = Clock::new();
    let mut sink = LogEventSink::new();
    let mut service = DeviceService::new(config.clone());
    let store = service.load_store(&nvs);
    let store = run_config_round(store, config.device_name.as_str(), &clock, &mut board);
    match service.save_if_changed(&store, &mut nvs, &mut sink) {
        Ok(true) => info!("Config round: field set saved"),
        Ok(false) => {}
        Err(e) => error!("Config round: save failed: {}", e),
    }

    // ── 5. WiFi station ───────────────────────────────────────
    let mut wifi = WifiAdapter::new(peripherals.modem, sysloop, nvs_partition)?;
    match service.network_credentials(&store) {
        Some((ssid, pass)) => {
            if let Err(e) = wifi.set_credentials(&ssid, &pass).and_then(|()| wifi.connect()) {
                warn!("WiFi: {}, retrying in background", e);
            }
        }
        None => warn!("WiFi: no network configured"),
    }

    // ── 6. Camera ─────────────────────────────────────────────
    let mut camera = CameraAdapter::new();
    if let Err(e) = camera.init() {
        error!("Camera init failed: {}", e);
    }

    // ── 7. Sync worker + timer task ───────────────────────────
    let handle = SyncHandle::new();
    let identity = service.identity(&store);
    info!("Sync: identity {:?}", identity);
    let mut engine = SyncEngine::new(config.clone(), identity, handle.clone());
    let _timer = timer_task::spawn(Scheduler::for_sync(&config), handle.clone(), config.scheduler_tick_ms)?;

    let mut net = HttpAdapter::new();
    let mut device = Device::new(&mut camera, &mut board);

    info!("System ready. Entering worker loop.");

    loop {
        events::drain_events(|event| match event {
            Event::ButtonPressed(n) => handle.on_button(n),
            other => info!("Worker: {:?} ignored outside config round", other),
        });

        wifi.poll(clock.uptime_ms());
        engine.run_once(wifi.is_connected(), &mut net, &mut device, &mut sink);
    }
}
