//! System configuration parameters
//!
//! Tunable timing and recovery policy for the sync engine.  Values can be
//! overridden via NVS; the user-facing fields (server, credentials, device
//! name) live in the BLE config store instead, see [`crate::provision`].

use serde::{Deserialize, Serialize};

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Identity defaults ---
    /// Server host used when the config store has no `h` value
    pub default_host: heapless::String<64>,
    /// Device name used when the config store has no `d` value
    pub device_name: heapless::String<32>,
    /// Optional free-form metadata sent with the auth request
    pub device_meta: heapless::String<32>,

    // --- Periodic triggers (milliseconds) ---
    pub get_msgs_period_ms: u32,
    pub send_msgs_period_ms: u32,
    pub stream_period_ms: u32,
    pub probe_period_ms: u32,
    /// Resolution of the timer task
    pub scheduler_tick_ms: u32,

    // --- Sync policy ---
    /// Incoming messages dispatched per worker tick
    pub incoming_batch: u8,
    /// Forced disconnect once this many protocol errors have accumulated
    pub max_protocol_errors: u32,
    /// Consecutive connect failures before the long delay applies
    pub connect_error_threshold: u32,
    /// Backoff grows by this much per consecutive connect failure
    pub backoff_unit_ms: u32,
    /// Backoff once past the threshold
    pub max_backoff_ms: u32,

    // --- Buffers ---
    pub response_initial_bytes: u32,
    pub response_max_bytes: u32,
    /// Idle resume rounds tolerated before a frame push is abandoned
    pub stream_stall_limit: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            default_host: heapless::String::try_from("https://localhost:8080").unwrap_or_default(),
            device_name: heapless::String::try_from("esp32-cam").unwrap_or_default(),
            device_meta: heapless::String::new(),

            get_msgs_period_ms: 5000,
            send_msgs_period_ms: 5000,
            stream_period_ms: 1000,
            probe_period_ms: 2000,
            scheduler_tick_ms: 100,

            incoming_batch: 3,
            max_protocol_errors: 10,
            connect_error_threshold: 10,
            backoff_unit_ms: 1000,
            max_backoff_ms: 30_000,

            response_initial_bytes: 0x8000,
            response_max_bytes: 0x20_0000,
            stream_stall_limit: 500,
        }
    }
}

impl SystemConfig {
    /// Delay before the next connect attempt after `errors` consecutive failures.
    ///
    /// Linear in the error count up to the threshold, then the long delay.
    pub fn backoff_delay_ms(&self, errors: u32) -> u32 {
        if errors > self.connect_error_threshold {
            self.max_backoff_ms
        } else {
            errors.saturating_mul(self.backoff_unit_ms).min(self.max_backoff_ms)
        }
    }
}
