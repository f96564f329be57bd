//! One-shot hardware peripheral initialization.
//!
//! Configures the probe ADC channel and the button interrupts using raw
//! ESP-IDF sys calls.  Called once from `main()` before the worker starts.
//! Board outputs are owned by [`crate::adapters::board`] through
//! `esp_idf_hal` pin drivers.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicU16, Ordering};

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    AdcInitFailed(i32),
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AdcInitFailed(rc) => write!(f, "ADC2 init failed (rc={})", rc),
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
        }
    }
}

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use crate::pins;

#[cfg(target_os = "espidf")]
pub fn init_peripherals() -> Result<(), HwInitError> {
    // SAFETY: Called once from main() before the worker; single-threaded.
    unsafe {
        init_adc()?;
        init_buttons()?;
    }
    info!("hw_init: all peripherals configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── ADC (oneshot, unit 2) ─────────────────────────────────────

#[cfg(target_os = "espidf")]
static mut ADC2_HANDLE: adc_oneshot_unit_handle_t = core::ptr::null_mut();

/// SAFETY: Must be called only after `init_adc()`; the handle is written
/// once at boot and read from the worker thread only.
#[cfg(target_os = "espidf")]
unsafe fn adc2_handle() -> adc_oneshot_unit_handle_t {
    unsafe { ADC2_HANDLE }
}

#[cfg(target_os = "espidf")]
unsafe fn init_adc() -> Result<(), HwInitError> {
    let init_cfg = adc_oneshot_unit_init_cfg_t {
        unit_id: adc_unit_t_ADC_UNIT_2,
        ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
        ..Default::default()
    };
    // SAFETY: ADC2_HANDLE is only written here, once at boot.
    let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &raw mut ADC2_HANDLE) };
    if ret != ESP_OK {
        return Err(HwInitError::AdcInitFailed(ret));
    }

    let chan_cfg = adc_oneshot_chan_cfg_t {
        atten: adc_atten_t_ADC_ATTEN_DB_0,
        bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
    };
    let ret = unsafe { adc_oneshot_config_channel(adc2_handle(), pins::PROBE_ADC_CHANNEL, &chan_cfg) };
    if ret != ESP_OK {
        return Err(HwInitError::AdcInitFailed(ret));
    }

    info!("hw_init: ADC2 configured (GPIO{} probe)", pins::PROBE_ADC_GPIO);
    Ok(())
}

/// One raw 12-bit probe sample; 0 when the read fails (ADC2 is shared with
/// the WiFi radio and can be busy).
#[cfg(target_os = "espidf")]
pub fn probe_read_raw() -> u16 {
    let mut raw: i32 = 0;
    // SAFETY: adc2_handle() contract, initialised, worker-thread access only.
    let ret = unsafe { adc_oneshot_read(adc2_handle(), pins::PROBE_ADC_CHANNEL, &mut raw) };
    if ret != ESP_OK {
        return 0;
    }
    raw.max(0) as u16
}

#[cfg(not(target_os = "espidf"))]
static SIM_PROBE_RAW: AtomicU16 = AtomicU16::new(0);

#[cfg(not(target_os = "espidf"))]
pub fn probe_read_raw() -> u16 {
    SIM_PROBE_RAW.load(Ordering::Relaxed)
}

/// Simulation: value returned by subsequent probe reads.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_probe_raw(raw: u16) {
    SIM_PROBE_RAW.store(raw, Ordering::Relaxed);
}

// ── Buttons ───────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe extern "C" fn button_gpio_isr(arg: *mut core::ffi::c_void) {
    // SAFETY: esp_timer_get_time is a RTC counter read; safe in ISR context.
    let now_ms = (unsafe { esp_timer_get_time() } / 1_000) as u32;
    crate::drivers::button::button_isr_handler(arg as usize as u8, now_ms);
}

/// Configure the button inputs and register their ISRs.
#[cfg(target_os = "espidf")]
unsafe fn init_buttons() -> Result<(), HwInitError> {
    // SAFETY: ESP_ERR_INVALID_STATE means the service is already installed.
    // ISR handlers only push to the lock-free event queue.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
            return Err(HwInitError::IsrInstallFailed(ret));
        }

        for (index, &pin) in pins::BUTTON_GPIOS.iter().enumerate() {
            let cfg = gpio_config_t {
                pin_bit_mask: 1u64 << pin,
                mode: gpio_mode_t_GPIO_MODE_INPUT,
                pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
                pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_ENABLE,
                intr_type: gpio_int_type_t_GPIO_INTR_POSEDGE,
            };
            let ret = gpio_config(&cfg);
            if ret != ESP_OK {
                return Err(HwInitError::GpioConfigFailed(ret));
            }
            gpio_isr_handler_add(pin, Some(button_gpio_isr), index as *mut core::ffi::c_void);
            gpio_intr_enable(pin);
        }
    }
    info!("hw_init: {} buttons armed", pins::BUTTON_GPIOS.len());
    Ok(())
}
