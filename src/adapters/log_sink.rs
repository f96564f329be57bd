//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Connected => info!("NET   | connected"),
            AppEvent::ConnectFailed { errors, retry_ms } => {
                warn!("NET   | connect failed ({} in a row), retry in {} ms", errors, retry_ms);
            }
            AppEvent::Authorized => info!("AUTH  | session established"),
            AppEvent::SessionLost => warn!("AUTH  | session rejected by server"),
            AppEvent::Disconnected => warn!("NET   | disconnected"),
            AppEvent::ForcedDisconnect => warn!("NET   | protocol error budget exhausted, reset"),
            AppEvent::MessagesFetched { count } => info!("MSGS  | {} incoming", count),
            AppEvent::MessagesSent { count } => info!("MSGS  | {} sent", count),
            AppEvent::SnapshotUploaded { bytes } => info!("SNAP  | {} bytes uploaded", bytes),
            AppEvent::FrameStreamed { bytes } => log::debug!("STRM  | {} bytes", bytes),
            AppEvent::ConfigSaved => info!("CFG   | field set saved"),
        }
    }
}
