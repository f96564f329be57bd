//! Camera adapter (OV2640 via the esp32-camera component).
//!
//! Implements [`CameraPort`].  Snapshots use SXGA, the periodic stream
//! uses VGA; the sensor frame size is only touched when the mode changes.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_camera_*` through the generated
//!   `esp_idf_svc::sys::camera` bindings.
//! - **all other targets**: synthetic JPEG frames for host-side tests.

use log::{info, warn};

use crate::app::ports::{CameraError, CameraPort, CaptureMode};

#[cfg(target_os = "espidf")]
use crate::pins;

pub struct CameraAdapter {
    mode: Option<CaptureMode>,
    initialized: bool,
    mode_switches: u32,
    #[cfg(not(target_os = "espidf"))]
    sim_fail_next: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_frame_no: u32,
}

impl Default for CameraAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraAdapter {
    pub fn new() -> Self {
        Self {
            mode: None,
            initialized: false,
            mode_switches: 0,
            #[cfg(not(target_os = "espidf"))]
            sim_fail_next: false,
            #[cfg(not(target_os = "espidf"))]
            sim_frame_no: 0,
        }
    }

    /// Bring the sensor up in snapshot mode.
    pub fn init(&mut self) -> Result<(), CameraError> {
        self.platform_init()?;
        self.initialized = true;
        self.mode = Some(CaptureMode::Snapshot);
        info!("Camera: initialized");
        Ok(())
    }

    /// Number of frame-size changes since init.
    pub fn mode_switches(&self) -> u32 {
        self.mode_switches
    }

    /// Simulation: make the next capture fail.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_fail_next_capture(&mut self) {
        self.sim_fail_next = true;
    }

    fn select_mode(&mut self, mode: CaptureMode) -> Result<(), CameraError> {
        if self.mode == Some(mode) {
            return Ok(());
        }
        self.platform_set_mode(mode)?;
        self.mode = Some(mode);
        self.mode_switches += 1;
        Ok(())
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_init(&mut self) -> Result<(), CameraError> {
        use esp_idf_svc::sys::camera::*;

        // SAFETY: plain C config struct; every field used is set below.
        let mut cfg: camera_config_t = unsafe { core::mem::zeroed() };
        cfg.pin_pwdn = pins::CAM_PIN_PWDN;
        cfg.pin_reset = pins::CAM_PIN_RESET;
        cfg.pin_xclk = pins::CAM_PIN_XCLK;
        cfg.__bindgen_anon_1.pin_sccb_sda = pins::CAM_PIN_SIOD;
        cfg.__bindgen_anon_2.pin_sccb_scl = pins::CAM_PIN_SIOC;
        cfg.pin_d7 = pins::CAM_PIN_D7;
        cfg.pin_d6 = pins::CAM_PIN_D6;
        cfg.pin_d5 = pins::CAM_PIN_D5;
        cfg.pin_d4 = pins::CAM_PIN_D4;
        cfg.pin_d3 = pins::CAM_PIN_D3;
        cfg.pin_d2 = pins::CAM_PIN_D2;
        cfg.pin_d1 = pins::CAM_PIN_D1;
        cfg.pin_d0 = pins::CAM_PIN_D0;
        cfg.pin_vsync = pins::CAM_PIN_VSYNC;
        cfg.pin_href = pins::CAM_PIN_HREF;
        cfg.pin_pclk = pins::CAM_PIN_PCLK;
        cfg.xclk_freq_hz = pins::CAM_XCLK_FREQ_HZ;
        cfg.ledc_timer = ledc_timer_t_LEDC_TIMER_0;
        cfg.ledc_channel = ledc_channel_t_LEDC_CHANNEL_0;
        cfg.pixel_format = pixformat_t_PIXFORMAT_JPEG;
        cfg.frame_size = framesize_t_FRAMESIZE_SXGA;
        cfg.jpeg_quality = pins::CAM_JPEG_QUALITY;
        cfg.fb_count = 1;
        cfg.fb_location = camera_fb_location_t_CAMERA_FB_IN_PSRAM;
        cfg.grab_mode = camera_grab_mode_t_CAMERA_GRAB_WHEN_EMPTY;

        // SAFETY: `cfg` outlives the call; the driver copies it.
        let ret = unsafe { esp_camera_init(&cfg) };
        if ret != 0 {
            warn!("Camera: esp_camera_init failed ({})", ret);
            return Err(CameraError::NotInitialized);
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_init(&mut self) -> Result<(), CameraError> {
        info!("Camera(sim): sensor ready");
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_set_mode(&mut self, mode: CaptureMode) -> Result<(), CameraError> {
        use esp_idf_svc::sys::camera::*;

        let size = match mode {
            CaptureMode::Snapshot => framesize_t_FRAMESIZE_SXGA,
            CaptureMode::Stream => framesize_t_FRAMESIZE_VGA,
        };
        // SAFETY: the sensor handle is valid after a successful init.
        unsafe {
            let sensor = esp_camera_sensor_get();
            let Some(set_framesize) = sensor.as_ref().and_then(|s| s.set_framesize) else {
                return Err(CameraError::NotInitialized);
            };
            if set_framesize(sensor, size) != 0 {
                warn!("Camera: frame size change failed");
                return Err(CameraError::CaptureFailed);
            }
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_set_mode(&mut self, mode: CaptureMode) -> Result<(), CameraError> {
        info!("Camera(sim): mode {:?}", mode);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_capture(&mut self) -> Result<Vec<u8>, CameraError> {
        use esp_idf_svc::sys::camera::*;

        // SAFETY: the frame buffer is returned to the driver before leaving.
        unsafe {
            let fb = esp_camera_fb_get();
            let Some(frame) = fb.as_ref() else {
                warn!("Camera: capture failed");
                return Err(CameraError::CaptureFailed);
            };
            let bytes = core::slice::from_raw_parts(frame.buf, frame.len).to_vec();
            esp_camera_fb_return(fb);
            Ok(bytes)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_capture(&mut self) -> Result<Vec<u8>, CameraError> {
        if core::mem::take(&mut self.sim_fail_next) {
            return Err(CameraError::CaptureFailed);
        }
        self.sim_frame_no = self.sim_frame_no.wrapping_add(1);
        let body = match self.mode {
            Some(CaptureMode::Snapshot) => 4096,
            _ => 1024,
        };
        let mut frame = Vec::with_capacity(body + 4);
        frame.extend_from_slice(&[0xFF, 0xD8]);
        frame.extend((0..body).map(|i| (i as u32 ^ self.sim_frame_no) as u8));
        frame.extend_from_slice(&[0xFF, 0xD9]);
        Ok(frame)
    }
}

impl CameraPort for CameraAdapter {
    fn capture(&mut self, mode: CaptureMode) -> Result<Vec<u8>, CameraError> {
        if !self.initialized {
            return Err(CameraError::NotInitialized);
        }
        self.select_mode(mode)?;
        self.platform_capture()
    }
}
