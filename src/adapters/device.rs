//! Device composite: pairs the camera with the board.
//!
//! The sync engine takes one `device` argument for capture, outputs, the
//! probe and backoff delays; this forwards each call to the adapter
//! that owns it.

use embedded_hal::delay::DelayNs;

use crate::app::ports::{BoardPort, CameraError, CameraPort, CaptureMode};

pub struct Device<'a, C, B> {
    camera: &'a mut C,
    board: &'a mut B,
}

impl<'a, C, B> Device<'a, C, B> {
    pub fn new(camera: &'a mut C, board: &'a mut B) -> Self {
        Self { camera, board }
    }
}

impl<C: CameraPort, B> CameraPort for Device<'_, C, B> {
    fn capture(&mut self, mode: CaptureMode) -> Result<Vec<u8>, CameraError> {
        self.camera.capture(mode)
    }
}

impl<C, B: BoardPort> BoardPort for Device<'_, C, B> {
    fn set_output(&mut self, pin: u8, level: bool) -> bool {
        self.board.set_output(pin, level)
    }

    fn sample_millivolts(&mut self) -> u32 {
        self.board.sample_millivolts()
    }
}

impl<C, B: DelayNs> DelayNs for Device<'_, C, B> {
    fn delay_ns(&mut self, ns: u32) {
        self.board.delay_ns(ns);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.board.delay_ms(ms);
    }
}
