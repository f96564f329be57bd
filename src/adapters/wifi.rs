//! WiFi station-mode adapter.
//!
//! Implements [`ConnectivityPort`]: the hexagonal boundary for network
//! connectivity.  Credentials come from the configuration field set
//! (`s` network id, `k` network secret).
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: ESP-IDF WiFi driver via `esp_idf_svc::wifi`.
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! ## Reconnection policy
//!
//! On disconnect the adapter waits an exponential backoff (2 s → 4 s →
//! 8 s … capped at 60 s) before retrying.

use core::fmt;
use log::{error, info, warn};

// ───────────────────────────────────────────────────────────────
// Port trait
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
    AlreadyConnected,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)"),
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
            Self::AlreadyConnected => write!(f, "already connected to AP"),
        }
    }
}

pub trait ConnectivityPort {
    fn connect(&mut self) -> Result<(), ConnectivityError>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    /// Advance reconnect handling.  `now_ms` is monotonic uptime.
    fn poll(&mut self, now_ms: u64);
    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError>;
    fn rssi(&self) -> Option<i8>;
}

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

const INITIAL_BACKOFF_SECS: u32 = 2;
const MAX_BACKOFF_SECS: u32 = 60;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    state: WifiState,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    backoff_secs: u32,
    /// Uptime at which the next reconnect attempt is due.
    retry_at_ms: Option<u64>,
    last_rssi: Option<i8>,
    #[cfg(target_os = "espidf")]
    wifi: esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>,
    /// Simulation: when set, the next connect attempt fails.
    #[cfg(not(target_os = "espidf"))]
    sim_fail_next: bool,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(
        modem: esp_idf_hal::modem::Modem,
        sysloop: esp_idf_svc::eventloop::EspSystemEventLoop,
        nvs: esp_idf_svc::nvs::EspDefaultNvsPartition,
    ) -> Result<Self, esp_idf_svc::sys::EspError> {
        use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
        let driver = EspWifi::new(modem, sysloop.clone(), Some(nvs))?;
        Ok(Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            backoff_secs: INITIAL_BACKOFF_SECS,
            retry_at_ms: None,
            last_rssi: None,
            wifi: BlockingWifi::wrap(driver, sysloop)?,
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            backoff_secs: INITIAL_BACKOFF_SECS,
            retry_at_ms: None,
            last_rssi: None,
            sim_fail_next: false,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    /// Simulation: make the next connect attempt fail.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_fail_next_connect(&mut self) {
        self.sim_fail_next = true;
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};

        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: self
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidSsid)?,
            password: self
                .password
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });

        let fail = |e: esp_idf_svc::sys::EspError| {
            warn!("WiFi(espidf): {}", e);
            ConnectivityError::ConnectionFailed
        };
        self.wifi.set_configuration(&config).map_err(fail)?;
        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi.start().map_err(fail)?;
        }
        self.wifi.connect().map_err(fail)?;
        self.wifi.wait_netif_up().map_err(fail)?;
        info!("WiFi(espidf): netif up");
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        if core::mem::take(&mut self.sim_fail_next) {
            warn!("WiFi(sim): simulated connect failure");
            return Err(ConnectivityError::ConnectionFailed);
        }
        info!("WiFi(sim): connected to '{}'", self.ssid);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        let _ = self.wifi.disconnect();
        let _ = self.wifi.stop();
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        info!("WiFi(sim): disconnected");
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.state == WifiState::Connected
    }

    #[cfg(target_os = "espidf")]
    fn platform_rssi(&self) -> Option<i8> {
        use esp_idf_svc::sys::{ESP_OK, esp_wifi_sta_get_ap_info, wifi_ap_record_t};
        // SAFETY: the record is plain data filled in by the driver.
        let mut info: wifi_ap_record_t = unsafe { core::mem::zeroed() };
        let ret = unsafe { esp_wifi_sta_get_ap_info(&mut info) };
        (ret == ESP_OK).then_some(info.rssi)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_rssi(&self) -> Option<i8> {
        (self.state == WifiState::Connected).then_some(-60)
    }
}

// ───────────────────────────────────────────────────────────────
// ConnectivityPort
// ───────────────────────────────────────────────────────────────

impl ConnectivityPort for WifiAdapter {
    fn connect(&mut self) -> Result<(), ConnectivityError> {
        if self.ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        if self.state == WifiState::Connected {
            return Err(ConnectivityError::AlreadyConnected);
        }

        info!("WiFi: connecting to '{}'", self.ssid);
        self.state = WifiState::Connecting;

        match self.platform_connect() {
            Ok(()) => {
                self.state = WifiState::Connected;
                self.backoff_secs = INITIAL_BACKOFF_SECS;
                self.last_rssi = self.platform_rssi();
                info!("WiFi: connected (RSSI={:?})", self.last_rssi);
                Ok(())
            }
            Err(e) => {
                error!("WiFi: connection failed: {}", e);
                self.state = WifiState::Reconnecting { attempt: 0 };
                self.retry_at_ms = None;
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) {
        self.platform_disconnect();
        self.state = WifiState::Disconnected;
        self.last_rssi = None;
        info!("WiFi: disconnected");
    }

    fn is_connected(&self) -> bool {
        self.platform_is_connected()
    }

    fn poll(&mut self, now_ms: u64) {
        match self.state {
            WifiState::Reconnecting { attempt } => {
                let due = *self
                    .retry_at_ms
                    .get_or_insert(now_ms + u64::from(self.backoff_secs) * 1000);
                if now_ms < due {
                    return;
                }
                info!("WiFi: reconnect attempt {} (backoff {}s)", attempt, self.backoff_secs);
                match self.platform_connect() {
                    Ok(()) => {
                        self.state = WifiState::Connected;
                        self.backoff_secs = INITIAL_BACKOFF_SECS;
                        self.retry_at_ms = None;
                        self.last_rssi = self.platform_rssi();
                        info!("WiFi: reconnected (RSSI={:?})", self.last_rssi);
                    }
                    Err(_) => {
                        self.backoff_secs = (self.backoff_secs * 2).min(MAX_BACKOFF_SECS);
                        self.retry_at_ms = Some(now_ms + u64::from(self.backoff_secs) * 1000);
                        self.state = WifiState::Reconnecting { attempt: attempt + 1 };
                    }
                }
            }
            WifiState::Connected => {
                if self.platform_is_connected() {
                    self.last_rssi = self.platform_rssi();
                } else {
                    warn!("WiFi: connection lost, entering reconnect");
                    self.state = WifiState::Reconnecting { attempt: 0 };
                    self.retry_at_ms = None;
                    self.last_rssi = None;
                }
            }
            _ => {}
        }
    }

    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid.push_str(ssid).map_err(|_| ConnectivityError::InvalidSsid)?;
        self.password.clear();
        self.password.push_str(password).map_err(|_| ConnectivityError::InvalidPassword)?;
        info!("WiFi: credentials updated (SSID='{}')", self.ssid);
        Ok(())
    }

    fn rssi(&self) -> Option<i8> {
        self.last_rssi
    }
}

impl WifiAdapter {
    /// Current reconnect delay.
    pub fn backoff_secs(&self) -> u32 {
        self.backoff_secs
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
