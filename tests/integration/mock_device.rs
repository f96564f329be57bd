//! Mock camera, board and event sink for integration tests.
//!
//! Records every output write and every delay so tests can assert on the
//! full history without touching GPIO or the sensor.

use camsync::app::events::AppEvent;
use camsync::app::ports::{BoardPort, CameraError, CameraPort, CaptureMode, EventSink};
use embedded_hal::delay::DelayNs;

// ── MockDevice ────────────────────────────────────────────────

pub struct MockDevice {
    pub captures: Vec<CaptureMode>,
    pub outputs: Vec<(u8, bool)>,
    pub delays_ms: Vec<u32>,
    pub probe_mv: u32,
    pub frame_len: usize,
    /// Captures that fail before the camera recovers.
    pub fail_captures: u32,
    /// Pins `set_output` accepts.
    pub known_pins: Vec<u8>,
}

#[allow(dead_code)]
impl MockDevice {
    pub fn new() -> Self {
        Self {
            captures: Vec::new(),
            outputs: Vec::new(),
            delays_ms: Vec::new(),
            probe_mv: 1234,
            frame_len: 100,
            fail_captures: 0,
            known_pins: vec![4, 33, 2, 14],
        }
    }

    /// The frame every capture returns.
    pub fn frame(&self) -> Vec<u8> {
        (0..self.frame_len).map(|i| i as u8).collect()
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraPort for MockDevice {
    fn capture(&mut self, mode: CaptureMode) -> Result<Vec<u8>, CameraError> {
        self.captures.push(mode);
        if self.fail_captures > 0 {
            self.fail_captures -= 1;
            return Err(CameraError::CaptureFailed);
        }
        Ok(self.frame())
    }
}

impl BoardPort for MockDevice {
    fn set_output(&mut self, pin: u8, level: bool) -> bool {
        if !self.known_pins.contains(&pin) {
            return false;
        }
        self.outputs.push((pin, level));
        true
    }

    fn sample_millivolts(&mut self) -> u32 {
        self.probe_mv
    }
}

impl DelayNs for MockDevice {
    fn delay_ns(&mut self, ns: u32) {
        self.delays_ms.push(ns / 1_000_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delays_ms.push(ms);
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saw(&self, event: &AppEvent) -> bool {
        self.events.contains(event)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
