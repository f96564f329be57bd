//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ SyncEngine / DeviceService (domain)
//! ```
//!
//! Driven adapters (HTTP session, camera, board I/O, storage) implement
//! these traits.  The engine consumes them via generics at call sites, so
//! the domain core never touches the network or hardware directly.
//!
//! ## Security notes
//!
//! - **ConfigPort** implementations MUST validate before persisting.
//! - **StoragePort** holds the user credentials; prefer the encrypted NVS
//!   partition on the device.

use crate::buffer::{OutboundBody, ResponseBuffer};
use crate::config::SystemConfig;
use crate::error::TransportError;

// ───────────────────────────────────────────────────────────────
// Network ports (driven adapter: domain ↔ server)
// ───────────────────────────────────────────────────────────────

/// One request/response connection to the server.
///
/// `post` streams `body` to the server and appends the whole response to
/// `response`.  The buffer's own overflow flag reports truncation; the
/// transport only fails for connection-level problems.
pub trait Exchange {
    fn connect(&mut self, host: &str) -> Result<(), TransportError>;

    fn post(
        &mut self,
        path: &str,
        body: &mut OutboundBody<'_>,
        response: &mut ResponseBuffer,
    ) -> Result<(), TransportError>;

    /// Tear the connection down.  Idempotent.
    fn disconnect(&mut self);
}

/// Identifier of an open upload stream.
pub type StreamId = u32;

/// Long-lived upload stream multiplexed on the [`Exchange`] connection.
pub trait StreamTransport {
    fn open(&mut self, path: &str) -> Result<StreamId, TransportError>;

    /// Largest slice `send` accepts in one call.
    fn max_chunk(&self) -> usize;

    /// Queue `bytes`; `last` marks the end of one frame (not of the stream).
    /// Returns how many previously queued bytes were flushed to the wire.
    fn send(&mut self, id: StreamId, bytes: &[u8], last: bool) -> Result<usize, TransportError>;

    /// Let the transport make progress without new data.  Returns flushed bytes.
    fn resume(&mut self, id: StreamId) -> Result<usize, TransportError>;

    fn close(&mut self, id: StreamId);
}

// ───────────────────────────────────────────────────────────────
// Device ports (driven adapter: domain ↔ hardware)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Full-resolution still.
    Snapshot,
    /// Reduced resolution for the periodic stream.
    Stream,
}

pub trait CameraPort {
    /// Capture one JPEG frame.
    fn capture(&mut self, mode: CaptureMode) -> Result<Vec<u8>, CameraError>;
}

pub trait BoardPort {
    /// Drive output `pin`.  Returns `false` for unknown pins.
    fn set_output(&mut self, pin: u8, level: bool) -> bool;

    /// Averaged probe reading in millivolts.
    fn sample_millivolts(&mut self) -> u32;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The engine emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// # Security
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// Keys are namespaced to prevent collisions between subsystems.  Writes
/// MUST be atomic: no partial values after power loss.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Scheduler delegate (decouples scheduler from the sync state)
// ───────────────────────────────────────────────────────────────

/// Callback trait that the scheduler invokes when a periodic task fires.
///
/// The [`SyncHandle`](crate::sync::SyncHandle) implements this by setting
/// the task's intent bit; the scheduler itself knows nothing about intents
/// beyond carrying the tag.
pub trait SchedulerDelegate {
    /// Whether tasks marked `requires_session` may fire now.
    fn session_ready(&self) -> bool;

    /// Called when a task fires.
    fn on_schedule_fired(&mut self, label: &str, intent: crate::sync::Intent);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Value larger than the caller's buffer.
    BufferTooSmall,
    /// Generic I/O error.
    IoError,
}

/// Errors from [`CameraPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraError {
    NotInitialized,
    CaptureFailed,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for CameraError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "camera not initialised"),
            Self::CaptureFailed => write!(f, "frame capture failed"),
        }
    }
}
