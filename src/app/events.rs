//! Outbound application events.
//!
//! The [`SyncEngine`](crate::sync::SyncEngine) and
//! [`DeviceService`](super::service::DeviceService) emit these through the
//! [`EventSink`](super::ports::EventSink) port.

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Transport connected to the server.
    Connected,
    /// Connect attempt failed; the worker sleeps `retry_ms`.
    ConnectFailed { errors: u32, retry_ms: u32 },
    /// A session id was obtained.
    Authorized,
    /// The server no longer knows our session.
    SessionLost,
    /// Transport dropped after a failed request.
    Disconnected,
    /// Protocol error budget exhausted; all state reset.
    ForcedDisconnect,
    /// `count` incoming messages fetched.
    MessagesFetched { count: usize },
    /// `count` outgoing messages accepted by the server.
    MessagesSent { count: usize },
    SnapshotUploaded { bytes: usize },
    FrameStreamed { bytes: usize },
    /// Config field set written to storage.
    ConfigSaved,
}
