//! Frame streaming over a long-lived upload stream.
//!
//! Each frame goes out as a 6-byte header followed by the JPEG payload:
//!
//! ```text
//!   ┌──────────┬──────────────┬───────────────────────┐
//!   │ magic    │ length       │ payload (length bytes) │
//!   │ u16 LE   │ u32 LE       │                        │
//!   │ 0xAAAA   │              │                        │
//!   └──────────┴──────────────┴───────────────────────┘
//! ```
//!
//! The worker pulls bytes with [`FrameStream::produce`], hands them to the
//! transport, and credits what the transport reports as flushed with
//! [`FrameStream::confirm`].  A frame is done once every byte is confirmed.

use log::{debug, info, warn};

use crate::app::ports::{StreamId, StreamTransport};
use crate::error::TransportError;

pub const FRAME_MAGIC: u16 = 0xAAAA;
pub const HEADER_LEN: usize = 6;

/// Result of one producer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Produce {
    /// `len` bytes were written; `last` once the frame is fully handed out.
    Data { len: usize, last: bool },
    /// Nothing to hand out right now.
    Deferred,
}

// ───────────────────────────────────────────────────────────────
// Producer
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FrameStream {
    payload: Vec<u8>,
    header: [u8; HEADER_LEN],
    pos: usize,
    sent_confirmed: usize,
}

impl FrameStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a new frame and rewind.
    pub fn load(&mut self, payload: Vec<u8>) {
        let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        self.header[..2].copy_from_slice(&FRAME_MAGIC.to_le_bytes());
        self.header[2..].copy_from_slice(&len.to_le_bytes());
        self.payload = payload;
        self.pos = 0;
        self.sent_confirmed = 0;
    }

    /// Header plus payload length.
    pub fn total_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn sent_confirmed(&self) -> usize {
        self.sent_confirmed
    }

    /// Copy the next bytes (header first, then payload) into `out`.
    pub fn produce(&mut self, out: &mut [u8]) -> Produce {
        let total = self.total_len();
        if self.pos >= total || out.is_empty() {
            return Produce::Deferred;
        }

        let mut written = 0;
        if self.pos < HEADER_LEN {
            let n = (HEADER_LEN - self.pos).min(out.len());
            out[..n].copy_from_slice(&self.header[self.pos..self.pos + n]);
            written = n;
            self.pos += n;
        }
        if written < out.len() && self.pos < total {
            let from = self.pos - HEADER_LEN;
            let n = (self.payload.len() - from).min(out.len() - written);
            out[written..written + n].copy_from_slice(&self.payload[from..from + n]);
            written += n;
            self.pos += n;
        }

        Produce::Data {
            len: written,
            last: self.pos == total,
        }
    }

    /// Credit `n` flushed bytes.  Never runs ahead of what was produced.
    pub fn confirm(&mut self, n: usize) {
        self.sent_confirmed = (self.sent_confirmed + n).min(self.pos);
    }

    pub fn is_finished(&self) -> bool {
        self.sent_confirmed == self.total_len()
    }
}

// ───────────────────────────────────────────────────────────────
// Driver
// ───────────────────────────────────────────────────────────────

/// Owns the open stream and pushes frames through it.
#[derive(Debug)]
pub struct FrameStreamer {
    frame: FrameStream,
    stream_id: Option<StreamId>,
    stall_limit: u32,
    scratch: Vec<u8>,
}

impl FrameStreamer {
    pub fn new(stall_limit: u32) -> Self {
        Self {
            frame: FrameStream::new(),
            stream_id: None,
            stall_limit,
            scratch: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream_id.is_some()
    }

    /// Send one frame, opening the stream on `path` first if needed.
    ///
    /// Any transport error tears the stream down.
    pub fn push(
        &mut self,
        net: &mut impl StreamTransport,
        path: &str,
        payload: Vec<u8>,
    ) -> Result<usize, TransportError> {
        let id = match self.stream_id {
            Some(id) => id,
            None => {
                let id = net.open(path)?;
                info!("Stream: opened (id={})", id);
                self.stream_id = Some(id);
                id
            }
        };

        self.frame.load(payload);
        let total = self.frame.total_len();
        match self.drive(net, id) {
            Ok(()) => Ok(total),
            Err(e) => {
                warn!("Stream: frame aborted at {}/{} bytes: {}", self.frame.sent_confirmed(), total, e);
                self.teardown(net);
                Err(e)
            }
        }
    }

    fn drive(&mut self, net: &mut impl StreamTransport, id: StreamId) -> Result<(), TransportError> {
        self.scratch.resize(net.max_chunk(), 0);
        let mut idle = 0u32;

        while !self.frame.is_finished() {
            let flushed = match self.frame.produce(&mut self.scratch) {
                Produce::Data { len, last } => net.send(id, &self.scratch[..len], last)?,
                Produce::Deferred => net.resume(id)?,
            };
            self.frame.confirm(flushed);

            if flushed == 0 {
                idle += 1;
                if idle > self.stall_limit {
                    return Err(TransportError::Stalled);
                }
            } else {
                idle = 0;
            }
        }
        debug!("Stream: frame of {} bytes confirmed", self.frame.total_len());
        Ok(())
    }

    /// Close the stream if open.
    pub fn teardown(&mut self, net: &mut impl StreamTransport) {
        if let Some(id) = self.stream_id.take() {
            net.close(id);
            info!("Stream: closed (id={})", id);
        }
    }
}
