//! Board adapter: outputs, probe ADC and blocking delays.
//!
//! Implements [`BoardPort`] and [`DelayNs`].  Outputs are any
//! `embedded_hal` output pins, addressed by their GPIO number so that
//! `output` messages can name them; a pin is only written when the
//! requested level differs from the last one.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{debug, warn};

use crate::app::ports::BoardPort;
use crate::drivers::hw_init;
use crate::pins;

/// Highest raw value of the 12-bit probe ADC.
const ADC_RAW_MAX: u32 = 4095;

struct Output<P> {
    gpio: u8,
    pin: P,
    /// LED wired to VCC: logical "on" drives the pin LOW.
    active_low: bool,
    level: Option<bool>,
}

pub struct BoardAdapter<P> {
    outputs: Vec<Output<P>>,
}

impl<P: OutputPin> Default for BoardAdapter<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: OutputPin> BoardAdapter<P> {
    pub fn new() -> Self {
        Self {
            outputs: Vec::new(),
        }
    }

    /// Register `pin` as output `gpio` and switch it off.
    pub fn with_output(mut self, gpio: u8, pin: P, active_low: bool) -> Self {
        let mut out = Output {
            gpio,
            pin,
            active_low,
            level: None,
        };
        if !Self::drive(&mut out, false) {
            warn!("Board: GPIO{} initial write failed", gpio);
        }
        self.outputs.push(out);
        self
    }

    /// Last level written to `gpio`.
    pub fn level(&self, gpio: u8) -> Option<bool> {
        self.outputs.iter().find(|o| o.gpio == gpio).and_then(|o| o.level)
    }

    fn drive(out: &mut Output<P>, level: bool) -> bool {
        let high = level != out.active_low;
        let res = if high { out.pin.set_high() } else { out.pin.set_low() };
        if res.is_err() {
            return false;
        }
        out.level = Some(level);
        true
    }
}

impl<P: OutputPin> BoardPort for BoardAdapter<P> {
    fn set_output(&mut self, gpio: u8, level: bool) -> bool {
        let Some(out) = self.outputs.iter_mut().find(|o| o.gpio == gpio) else {
            warn!("Board: output GPIO{} is not found", gpio);
            return false;
        };
        if out.level == Some(level) {
            return true;
        }
        debug!("Board: GPIO{} -> {}", gpio, u8::from(level));
        if !Self::drive(out, level) {
            warn!("Board: GPIO{} write failed", gpio);
            return false;
        }
        true
    }

    fn sample_millivolts(&mut self) -> u32 {
        let sum: u32 = (0..pins::PROBE_SAMPLES)
            .map(|_| u32::from(hw_init::probe_read_raw()))
            .sum();
        let raw = sum / pins::PROBE_SAMPLES;
        raw.min(ADC_RAW_MAX) * pins::PROBE_FULL_SCALE_MV / ADC_RAW_MAX
    }
}

impl<P> DelayNs for BoardAdapter<P> {
    #[cfg(target_os = "espidf")]
    fn delay_ns(&mut self, ns: u32) {
        DelayNs::delay_ns(&mut esp_idf_hal::delay::FreeRtos, ns);
    }

    #[cfg(target_os = "espidf")]
    fn delay_ms(&mut self, ms: u32) {
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
