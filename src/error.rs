//! Unified error types for the camsync firmware.
//!
//! A single `Error` enum that every subsystem converts into, so the sync
//! worker can classify a failure (retry, count, re-authenticate, skip) with
//! one `match`.  All variants are `Copy` so they pass through the engine's
//! step functions without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Connect/send/receive failure.  Retried with backoff, never fatal.
    Transport(TransportError),
    /// The server answered with a non-OK result.
    Protocol(ProtocolError),
    /// The server no longer knows our session id.  Forces re-authentication.
    SessionInvalid,
    /// A chunked write fell outside the channel capacity.
    Bounds(BoundsError),
    /// An incoming message lacks a required field.  Skipped, not retried.
    Malformed(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::SessionInvalid => write!(f, "session invalid"),
            Self::Bounds(e) => write!(f, "bounds: {e}"),
            Self::Malformed(what) => write!(f, "malformed message: {what}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// TLS/TCP connection to the server could not be established.
    ConnectFailed,
    /// Writing the request body failed.
    SendFailed,
    /// Reading the response failed or the stream was reset.
    ReceiveFailed,
    /// An operation needs a live connection and there is none.
    NotConnected,
    /// The remote peer sent GOAWAY; the connection is unusable.
    GoAway,
    /// The stream made no progress within the stall limit.
    Stalled,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::SendFailed => write!(f, "send failed"),
            Self::ReceiveFailed => write!(f, "receive failed"),
            Self::NotConnected => write!(f, "not connected"),
            Self::GoAway => write!(f, "remote sent GOAWAY"),
            Self::Stalled => write!(f, "stream stalled"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// The server reported a nonzero result code.
    ServerCode(i64),
    /// `result` was present but not `"OK"`.
    BadResult,
    /// The auth response carried no usable `shash`.
    MissingSessionId,
    /// The response body was not a JSON object.
    UnparsableResponse,
    /// The response did not fit in the maximum response buffer.
    ResponseOverflow,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerCode(code) => write!(f, "server code {code}"),
            Self::BadResult => write!(f, "result not OK"),
            Self::MissingSessionId => write!(f, "missing session id"),
            Self::UnparsableResponse => write!(f, "unparsable response"),
            Self::ResponseOverflow => write!(f, "response buffer overflow"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Buffer bounds errors
// ---------------------------------------------------------------------------

/// A chunked write was rejected.  The accumulation buffer is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsError {
    /// `offset` lies beyond the channel capacity.
    OffsetOutOfRange,
    /// `offset + len` exceeds the channel capacity.
    LengthExceeded,
}

impl fmt::Display for BoundsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OffsetOutOfRange => write!(f, "offset out of range"),
            Self::LengthExceeded => write!(f, "length exceeded"),
        }
    }
}

impl From<BoundsError> for Error {
    fn from(e: BoundsError) -> Self {
        Self::Bounds(e)
    }
}

impl Error {
    /// Whether this error means the connection itself is gone.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
