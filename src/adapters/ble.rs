//! BLE configuration adapter.
//!
//! Implements [`ConfigAccessPort`]: the hexagonal boundary for the
//! short-range configuration exchange.  The GATT plumbing feeds a
//! [`SharedChannel`]; all protocol decisions live in
//! [`crate::provision::channel`].
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid BLE GATT server via `esp_idf_svc::sys`.
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! ## GATT Service Layout
//!
//! | Characteristic | UUID                        | Perms                 |
//! |----------------|-----------------------------|-----------------------|
//! | Command        | `c5a30002-…-91d2e6f4b801`   | Write (+ long write)  |
//! | Page           | `c5a30003-…-91d2e6f4b801`   | Read+Notify (+ CCC)   |

use core::fmt;
use log::{debug, info, warn};

use crate::error::BoundsError;
use crate::provision::{ChannelAction, ConfigChannel, Page, SharedChannel};

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0xc5a30001_4e7b_4c0a_8d3f_91d2e6f4b801;
pub const CHAR_COMMAND: u128 = 0xc5a30002_4e7b_4c0a_8d3f_91d2e6f4b801;
pub const CHAR_PAGE: u128 = 0xc5a30003_4e7b_4c0a_8d3f_91d2e6f4b801;

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningError {
    StackInitFailed,
    NotAdvertising,
    Bounds(BoundsError),
}

impl fmt::Display for ProvisioningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackInitFailed => write!(f, "BLE stack initialisation failed"),
            Self::NotAdvertising => write!(f, "BLE write outside a configuration round"),
            Self::Bounds(e) => write!(f, "BLE write rejected: {}", e),
        }
    }
}

impl From<BoundsError> for ProvisioningError {
    fn from(e: BoundsError) -> Self {
        Self::Bounds(e)
    }
}

// ───────────────────────────────────────────────────────────────
// Port trait
// ───────────────────────────────────────────────────────────────

pub trait ConfigAccessPort {
    fn start(&mut self) -> Result<(), ProvisioningError>;
    fn stop(&mut self);
    fn is_active(&self) -> bool;
    /// Pager step; sends at most one page.  Call every
    /// [`crate::provision::channel::NOTIFY_PERIOD_MS`].
    fn pump_notify(&mut self) -> Option<usize>;
}

// ───────────────────────────────────────────────────────────────
// BLE state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Advertising,
    Connected,
    Failed,
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF GATT callbacks
// ───────────────────────────────────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures.  Handles live in atomics; the channel is parked in a static
// while the stack runs.  Callbacks run in the Bluedroid task, so a std
// Mutex is fine.

#[cfg(target_os = "espidf")]
mod gatt {
    use core::sync::atomic::{AtomicU32, Ordering};
    use esp_idf_svc::sys::*;
    use std::sync::Mutex;

    use super::{CHAR_COMMAND, CHAR_PAGE, SERVICE_UUID};
    use crate::events::{Event, push_event};
    use crate::provision::{ChannelAction, ConfigChannel, SharedChannel};

    const CCC_UUID: u16 = 0x2902;

    pub static GATTS_IF: AtomicU32 = AtomicU32::new(0);
    /// Connection id + 1; zero means no peer.
    pub static CONN: AtomicU32 = AtomicU32::new(0);
    pub static PAGE_HANDLE: AtomicU32 = AtomicU32::new(0);
    static COMMAND_HANDLE: AtomicU32 = AtomicU32::new(0);
    static CCC_HANDLE: AtomicU32 = AtomicU32::new(0);
    static SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
    static CHAR_STEP: AtomicU32 = AtomicU32::new(0);

    pub static CHANNEL: Mutex<Option<SharedChannel>> = Mutex::new(None);

    fn with_channel<R>(f: impl FnOnce(&mut ConfigChannel) -> R) -> Option<R> {
        let slot = CHANNEL.lock().ok()?;
        let shared = slot.as_ref()?;
        Some(f(&mut ConfigChannel::lock(shared)))
    }

    fn uuid128(uuid: u128) -> esp_bt_uuid_t {
        // SAFETY: plain C struct, all-zero is valid.
        let mut t: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        t.len = 16;
        t.uuid.uuid128 = uuid.to_le_bytes();
        t
    }

    fn uuid16(uuid: u16) -> esp_bt_uuid_t {
        // SAFETY: plain C struct, all-zero is valid.
        let mut t: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        t.len = 2;
        t.uuid.uuid16 = uuid;
        t
    }

    pub fn adv_params() -> esp_ble_adv_params_t {
        esp_ble_adv_params_t {
            adv_int_min: 0x20,
            adv_int_max: 0x40,
            adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
            adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
            // SAFETY: remaining fields are plain data.
            ..unsafe { core::mem::zeroed() }
        }
    }

    unsafe fn add_char(svc_handle: u16, uuid: u128, perm: u32, prop: u32) {
        let mut char_uuid = uuid128(uuid);
        // SAFETY: pointers are valid for the duration of the call.
        unsafe {
            esp_ble_gatts_add_char(
                svc_handle,
                &mut char_uuid,
                perm as esp_gatt_perm_t,
                prop as esp_gatt_char_prop_t,
                core::ptr::null_mut(),
                core::ptr::null_mut(),
            );
        }
    }

    unsafe fn respond(gatts_if: esp_gatt_if_t, conn_id: u16, trans_id: u32, rsp: *mut esp_gatt_rsp_t) {
        // SAFETY: `rsp` is null or points to a live response.
        unsafe {
            esp_ble_gatts_send_response(gatts_if, conn_id, trans_id, esp_gatt_status_t_ESP_GATT_OK, rsp);
        }
    }

    fn report(action: ChannelAction) {
        if action == ChannelAction::ExitRequested {
            push_event(Event::ConfigExitRequested);
        }
    }

    pub unsafe extern "C" fn gap_event_handler(
        event: esp_gap_ble_cb_event_t,
        _param: *mut esp_ble_gap_cb_param_t,
    ) {
        match event {
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
                log::info!("BLE GAP: advertising started");
            }
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
                log::info!("BLE GAP: advertising stopped");
            }
            _ => {}
        }
    }

    pub unsafe extern "C" fn gatts_event_handler(
        event: esp_gatts_cb_event_t,
        gatts_if: esp_gatt_if_t,
        param: *mut esp_ble_gatts_cb_param_t,
    ) {
        GATTS_IF.store(gatts_if as u32, Ordering::Relaxed);

        // SAFETY: Bluedroid hands a valid parameter block for `event`.
        unsafe {
            match event {
                esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
                    let mut svc_id = esp_gatt_srvc_id_t {
                        id: esp_gatt_id_t {
                            uuid: uuid128(SERVICE_UUID),
                            inst_id: 0,
                        },
                        is_primary: true,
                    };
                    esp_ble_gatts_create_service(gatts_if, &mut svc_id, 8);
                }
                esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
                    let svc_handle = (*param).create.service_handle;
                    SVC_HANDLE.store(svc_handle as u32, Ordering::Relaxed);
                    esp_ble_gatts_start_service(svc_handle);
                    CHAR_STEP.store(1, Ordering::Relaxed);
                    add_char(svc_handle, CHAR_COMMAND, ESP_GATT_PERM_WRITE, ESP_GATT_CHAR_PROP_BIT_WRITE);
                }
                esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
                    let handle = (*param).add_char.attr_handle;
                    let svc_handle = SVC_HANDLE.load(Ordering::Relaxed) as u16;
                    match CHAR_STEP.load(Ordering::Relaxed) {
                        1 => {
                            COMMAND_HANDLE.store(handle as u32, Ordering::Relaxed);
                            CHAR_STEP.store(2, Ordering::Relaxed);
                            add_char(
                                svc_handle,
                                CHAR_PAGE,
                                ESP_GATT_PERM_READ,
                                ESP_GATT_CHAR_PROP_BIT_READ | ESP_GATT_CHAR_PROP_BIT_NOTIFY,
                            );
                        }
                        2 => {
                            PAGE_HANDLE.store(handle as u32, Ordering::Relaxed);
                            CHAR_STEP.store(3, Ordering::Relaxed);
                            let mut ccc = uuid16(CCC_UUID);
                            esp_ble_gatts_add_char_descr(
                                svc_handle,
                                &mut ccc,
                                (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                                core::ptr::null_mut(),
                                core::ptr::null_mut(),
                            );
                        }
                        _ => {}
                    }
                }
                esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
                    let handle = (*param).add_char_descr.attr_handle;
                    CCC_HANDLE.store(handle as u32, Ordering::Relaxed);
                    log::info!("BLE GATTS: config service registered");
                }
                esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
                    let conn_id = (*param).connect.conn_id;
                    CONN.store(u32::from(conn_id) + 1, Ordering::Relaxed);
                    with_channel(ConfigChannel::on_peer_connected);
                    log::info!("BLE GATTS: peer connected (conn_id={})", conn_id);
                    push_event(Event::ConfigPeerConnected);
                }
                esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
                    CONN.store(0, Ordering::Relaxed);
                    with_channel(ConfigChannel::on_peer_disconnected);
                    log::info!("BLE GATTS: peer disconnected");
                    push_event(Event::ConfigPeerDisconnected);
                    let mut adv = adv_params();
                    esp_ble_gap_start_advertising(&mut adv);
                }
                esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
                    let p = &(*param).write;
                    let data = core::slice::from_raw_parts(p.value, p.len as usize);
                    let handle = u32::from(p.handle);

                    if handle == CCC_HANDLE.load(Ordering::Relaxed) && data.len() >= 2 {
                        let value = u16::from_le_bytes([data[0], data[1]]);
                        with_channel(|c| c.on_notify_config(value));
                    } else if handle == COMMAND_HANDLE.load(Ordering::Relaxed) {
                        let offset = usize::from(p.offset);
                        if p.is_prep {
                            with_channel(|c| c.on_prepare_write(offset, data));
                        } else if let Some(Ok(action)) = with_channel(|c| c.on_write(offset, data)) {
                            report(action);
                        }
                    }
                    if p.need_rsp {
                        respond(gatts_if, p.conn_id, p.trans_id, core::ptr::null_mut());
                    }
                }
                esp_gatts_cb_event_t_ESP_GATTS_EXEC_WRITE_EVT => {
                    let p = &(*param).exec_write;
                    let execute = u32::from(p.exec_write_flag) == ESP_GATT_PREP_WRITE_EXEC;
                    if let Some(action) = with_channel(|c| c.on_execute_write(execute)) {
                        report(action);
                    }
                    respond(gatts_if, p.conn_id, p.trans_id, core::ptr::null_mut());
                }
                esp_gatts_cb_event_t_ESP_GATTS_READ_EVT => {
                    let p = &(*param).read;
                    let mut rsp: esp_gatt_rsp_t = core::mem::zeroed();
                    rsp.attr_value.handle = p.handle;
                    if u32::from(p.handle) == PAGE_HANDLE.load(Ordering::Relaxed) {
                        if let Some(Some(page)) = with_channel(ConfigChannel::on_read) {
                            let bytes = page.as_bytes_with_nul();
                            rsp.attr_value.value[..bytes.len()].copy_from_slice(bytes);
                            rsp.attr_value.len = bytes.len() as u16;
                        }
                    }
                    if p.need_rsp {
                        respond(gatts_if, p.conn_id, p.trans_id, &mut rsp);
                    }
                }
                esp_gatts_cb_event_t_ESP_GATTS_CONF_EVT => {
                    with_channel(ConfigChannel::on_confirm);
                }
                _ => {}
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// BLE adapter
// ───────────────────────────────────────────────────────────────

pub struct BleAdapter {
    state: BleState,
    device_name: heapless::String<32>,
    channel: SharedChannel,
    pages_sent: usize,
    /// Simulation: notifications sent, newest last.
    #[cfg(not(target_os = "espidf"))]
    sim_notified: Vec<Vec<u8>>,
}

impl BleAdapter {
    pub fn new(device_name: &str, channel: SharedChannel) -> Self {
        let mut name = heapless::String::new();
        for c in device_name.chars() {
            if name.push(c).is_err() {
                break;
            }
        }
        Self {
            state: BleState::Idle,
            device_name: name,
            channel,
            pages_sent: 0,
            #[cfg(not(target_os = "espidf"))]
            sim_notified: Vec::new(),
        }
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    pub fn channel(&self) -> &SharedChannel {
        &self.channel
    }

    /// Pages notified since start.
    pub fn pages_sent(&self) -> usize {
        self.pages_sent
    }

    // ── Peer-side entry points (simulation and tests) ─────────

    pub fn on_central_connected(&mut self) {
        info!("BLE: central connected");
        self.state = BleState::Connected;
        ConfigChannel::lock(&self.channel).on_peer_connected();
    }

    pub fn on_central_disconnected(&mut self) {
        info!("BLE: central disconnected");
        if self.state != BleState::Idle {
            self.state = BleState::Advertising;
        }
        ConfigChannel::lock(&self.channel).on_peer_disconnected();
    }

    pub fn on_command_write(&mut self, offset: usize, data: &[u8]) -> Result<ChannelAction, ProvisioningError> {
        self.require_peer()?;
        Ok(ConfigChannel::lock(&self.channel).on_write(offset, data)?)
    }

    pub fn on_command_prepare(&mut self, offset: usize, data: &[u8]) -> Result<(), ProvisioningError> {
        self.require_peer()?;
        Ok(ConfigChannel::lock(&self.channel).on_prepare_write(offset, data)?)
    }

    pub fn on_command_execute(&mut self, execute: bool) -> Result<ChannelAction, ProvisioningError> {
        self.require_peer()?;
        Ok(ConfigChannel::lock(&self.channel).on_execute_write(execute))
    }

    pub fn on_descriptor_write(&mut self, value: u16) {
        ConfigChannel::lock(&self.channel).on_notify_config(value);
    }

    pub fn on_page_read(&mut self) -> Option<Page> {
        ConfigChannel::lock(&self.channel).on_read()
    }

    pub fn on_confirm(&mut self) {
        ConfigChannel::lock(&self.channel).on_confirm();
    }

    /// Simulation: drain the notifications sent so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn take_notified(&mut self) -> Vec<Vec<u8>> {
        core::mem::take(&mut self.sim_notified)
    }

    fn require_peer(&self) -> Result<(), ProvisioningError> {
        if matches!(self.state, BleState::Idle | BleState::Failed) {
            return Err(ProvisioningError::NotAdvertising);
        }
        Ok(())
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self) -> Result<(), ProvisioningError> {
        use esp_idf_svc::sys::*;

        if let Ok(mut slot) = gatt::CHANNEL.lock() {
            *slot = Some(self.channel.clone());
        }

        let check = |ret: esp_err_t, what: &str| {
            if ret == ESP_OK {
                Ok(())
            } else {
                log::error!("BLE: {} failed ({})", what, ret);
                Err(ProvisioningError::StackInitFailed)
            }
        };

        // SAFETY: Bluedroid bring-up sequence; pointers outlive each call.
        unsafe {
            // Release classic BT memory (BLE-only mode).
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            check(esp_bt_controller_init(&mut bt_cfg), "bt_controller_init")?;
            check(esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE), "bt_controller_enable")?;
            check(esp_bluedroid_init(), "bluedroid_init")?;
            check(esp_bluedroid_enable(), "bluedroid_enable")?;

            esp_ble_gap_register_callback(Some(gatt::gap_event_handler));
            esp_ble_gatts_register_callback(Some(gatt::gatts_event_handler));
            esp_ble_gatts_app_register(0);
            esp_ble_gatt_set_local_mtu(64);

            let mut name = self.device_name.clone();
            let _ = name.push('\0');
            esp_ble_gap_set_device_name(name.as_ptr().cast());

            let mut adv = gatt::adv_params();
            esp_ble_gap_start_advertising(&mut adv);
        }
        info!("BLE(espidf): advertising as '{}'", self.device_name);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self) -> Result<(), ProvisioningError> {
        info!(
            "BLE(sim): advertising '{}' (service {:032x})",
            self.device_name, SERVICE_UUID
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&mut self) {
        use esp_idf_svc::sys::*;
        // SAFETY: teardown mirrors the bring-up order.
        unsafe {
            esp_ble_gap_stop_advertising();
            esp_bluedroid_disable();
            esp_bluedroid_deinit();
            esp_bt_controller_disable();
            esp_bt_controller_deinit();
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_BTDM);
        }
        if let Ok(mut slot) = gatt::CHANNEL.lock() {
            *slot = None;
        }
        gatt::CONN.store(0, core::sync::atomic::Ordering::Relaxed);
        info!("BLE(espidf): stack shut down, memory released");
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&mut self) {
        info!("BLE(sim): stopped");
    }

    #[cfg(target_os = "espidf")]
    fn platform_notify(&mut self, payload: &[u8]) -> bool {
        use core::sync::atomic::Ordering;
        use esp_idf_svc::sys::*;

        let handle = gatt::PAGE_HANDLE.load(Ordering::Relaxed);
        let conn = gatt::CONN.load(Ordering::Relaxed);
        if handle == 0 || conn == 0 {
            return false;
        }
        let mut buf = heapless::Vec::<u8, 32>::new();
        if buf.extend_from_slice(payload).is_err() {
            return false;
        }
        // SAFETY: `buf` outlives the call; the stack copies the value.
        let ret = unsafe {
            esp_ble_gatts_send_indicate(
                gatt::GATTS_IF.load(Ordering::Relaxed) as esp_gatt_if_t,
                (conn - 1) as u16,
                handle as u16,
                buf.len() as u16,
                buf.as_mut_ptr(),
                false,
            )
        };
        ret == ESP_OK
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_notify(&mut self, payload: &[u8]) -> bool {
        self.sim_notified.push(payload.to_vec());
        true
    }
}

// ───────────────────────────────────────────────────────────────
// ConfigAccessPort implementation
// ───────────────────────────────────────────────────────────────

impl ConfigAccessPort for BleAdapter {
    fn start(&mut self) -> Result<(), ProvisioningError> {
        info!("BLE: starting advertising as '{}'", self.device_name);
        if let Err(e) = self.platform_start() {
            self.state = BleState::Failed;
            return Err(e);
        }
        self.state = BleState::Advertising;
        self.pages_sent = 0;
        Ok(())
    }

    fn stop(&mut self) {
        if self.state == BleState::Idle {
            return;
        }
        self.platform_stop();
        self.state = BleState::Idle;
        ConfigChannel::lock(&self.channel).on_peer_disconnected();
        info!("BLE: stopped ({} pages sent)", self.pages_sent);
    }

    fn is_active(&self) -> bool {
        matches!(self.state, BleState::Advertising | BleState::Connected)
    }

    fn pump_notify(&mut self) -> Option<usize> {
        let page = ConfigChannel::lock(&self.channel).next_page()?;
        if !self.platform_notify(page.as_bytes_with_nul()) {
            warn!("BLE: page notify failed");
            return None;
        }
        self.pages_sent += 1;
        debug!("BLE: page {} sent ({} bytes)", self.pages_sent, page.len());
        Some(page.len())
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
