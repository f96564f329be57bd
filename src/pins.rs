//! GPIO / peripheral pin assignments for the ESP32-CAM (AI-Thinker) board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Board outputs (addressable by `output` messages)
// ---------------------------------------------------------------------------

/// High-power flash LED next to the lens.
pub const FLASH_LED_GPIO: u8 = 4;
/// Red on-board LED, lit when the pin is LOW.
pub const STATUS_LED_GPIO: u8 = 33;
pub const OUT1_GPIO: u8 = 2;
pub const OUT2_GPIO: u8 = 14;

// ---------------------------------------------------------------------------
// User buttons (active HIGH, external pull-down)
// ---------------------------------------------------------------------------

pub const BUTTON_GPIOS: [i32; 2] = [12, 13];

// ---------------------------------------------------------------------------
// Probe input (ADC2)
// ---------------------------------------------------------------------------

/// GPIO 15 is ADC2 channel 3.
pub const PROBE_ADC_GPIO: i32 = 15;
pub const PROBE_ADC_CHANNEL: u32 = 3;
/// Raw samples averaged per reading.
pub const PROBE_SAMPLES: u32 = 4;
/// Full-scale input at 0 dB attenuation.
pub const PROBE_FULL_SCALE_MV: u32 = 1100;

// ---------------------------------------------------------------------------
// Camera (OV2640)
// ---------------------------------------------------------------------------

pub const CAM_PIN_PWDN: i32 = 32;
/// Software reset.
pub const CAM_PIN_RESET: i32 = -1;
pub const CAM_PIN_XCLK: i32 = 0;
pub const CAM_PIN_SIOD: i32 = 26;
pub const CAM_PIN_SIOC: i32 = 27;

pub const CAM_PIN_D7: i32 = 35;
pub const CAM_PIN_D6: i32 = 34;
pub const CAM_PIN_D5: i32 = 39;
pub const CAM_PIN_D4: i32 = 36;
pub const CAM_PIN_D3: i32 = 21;
pub const CAM_PIN_D2: i32 = 19;
pub const CAM_PIN_D1: i32 = 18;
pub const CAM_PIN_D0: i32 = 5;
pub const CAM_PIN_VSYNC: i32 = 25;
pub const CAM_PIN_HREF: i32 = 23;
pub const CAM_PIN_PCLK: i32 = 22;

pub const CAM_XCLK_FREQ_HZ: i32 = 20_000_000;
pub const CAM_JPEG_QUALITY: i32 = 12;
