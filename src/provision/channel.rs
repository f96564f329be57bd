//! Chunked command/page channel over two fixed-size characteristics.
//!
//! ```text
//!   peer ──prepare(off, bytes)*──▶ PrepareBuffer ──execute──▶ command
//!                                  (128 bytes)                 │
//!        "*get*"  → restart disclosure                         │
//!        "*set*{...}" → ConfigStore::set_field  ◀──────────────┘
//!        "*cmd*exit"  → end of session
//!
//!   peer ◀──notify(page ≤ 20 B + NUL)── pager (every 250 ms, one per ack)
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use serde_json::{Map, Value};

use super::store::{ConfigStore, FieldId, Page};
use crate::error::BoundsError;

/// Inbound command buffer size.
pub const MAX_COMMAND_LEN: usize = 128;

/// Pager period.
pub const NOTIFY_PERIOD_MS: u32 = 250;

/// Client characteristic configuration values.
pub const CCC_NOTIFY_ENABLE: u16 = 0x0001;
pub const CCC_DISABLE: u16 = 0x0000;

// ───────────────────────────────────────────────────────────────
// Reassembly
// ───────────────────────────────────────────────────────────────

/// Accumulates prepared writes until the peer executes or cancels.
#[derive(Debug, Clone)]
pub struct PrepareBuffer {
    buf: [u8; MAX_COMMAND_LEN],
    len: usize,
}

impl Default for PrepareBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PrepareBuffer {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_COMMAND_LEN],
            len: 0,
        }
    }

    /// Place `data` at `offset`.  Rejected writes leave the buffer untouched.
    pub fn prepare(&mut self, offset: usize, data: &[u8]) -> Result<(), BoundsError> {
        if offset > MAX_COMMAND_LEN {
            return Err(BoundsError::OffsetOutOfRange);
        }
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= MAX_COMMAND_LEN)
            .ok_or(BoundsError::LengthExceeded)?;
        self.buf[offset..end].copy_from_slice(data);
        self.len = self.len.max(end);
        Ok(())
    }

    /// Hand out the accumulated command and clear.
    pub fn commit(&mut self) -> heapless::Vec<u8, MAX_COMMAND_LEN> {
        let mut out = heapless::Vec::new();
        // Capacity equals the buffer size; cannot fail.
        let _ = out.extend_from_slice(&self.buf[..self.len]);
        self.cancel();
        out
    }

    pub fn cancel(&mut self) {
        self.buf = [0; MAX_COMMAND_LEN];
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

// ───────────────────────────────────────────────────────────────
// Command grammar
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Restart disclosure from the first byte.
    Get,
    /// Raw `set` payload.
    Set(&'a str),
    /// Terminate the configuration session.
    Exit,
    Unknown,
}

/// Split `*<verb>*<payload>`.  Trailing NULs are ignored.
pub fn parse_command(raw: &[u8]) -> Command<'_> {
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    let Ok(text) = core::str::from_utf8(&raw[..end]) else {
        return Command::Unknown;
    };
    let Some(rest) = text.strip_prefix('*') else {
        return Command::Unknown;
    };
    let Some((verb, payload)) = rest.split_once('*') else {
        return Command::Unknown;
    };
    match verb {
        "get" => Command::Get,
        "set" => Command::Set(payload),
        "cmd" if payload.trim_end() == "exit" => Command::Exit,
        _ => Command::Unknown,
    }
}

/// Apply a `set` payload to the store.
///
/// The payload is cut after its last `}` and parsed as a JSON object.  The
/// first field (in id order) present with a string value and writable is
/// updated; anything else is discarded.
pub fn apply_set(store: &mut ConfigStore, payload: &str) -> Option<FieldId> {
    let cut = payload.rfind('}')?;
    let record: Map<String, Value> = serde_json::from_str(&payload[..=cut]).ok()?;

    let id = FieldId::ALL.into_iter().find(|id| {
        id.access().is_writable() && record.get(id.key()).is_some_and(Value::is_string)
    })?;
    let value = record.get(id.key()).and_then(Value::as_str)?;
    store.set_field(id, value);
    Some(id)
}

// ───────────────────────────────────────────────────────────────
// Channel
// ───────────────────────────────────────────────────────────────

/// Outcome of an inbound operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAction {
    Ignored,
    /// Disclosure restarted from the first page.
    Restarted,
    /// A field value was replaced.
    Updated(FieldId),
    /// Peer asked to end the session.
    ExitRequested,
}

/// Config store plus the state of one short-range session.
#[derive(Debug)]
pub struct ConfigChannel {
    store: ConfigStore,
    inbound: PrepareBuffer,
    notify_enabled: bool,
    ready: bool,
    changed: bool,
}

pub type SharedChannel = Arc<Mutex<ConfigChannel>>;

impl ConfigChannel {
    pub fn new(store: ConfigStore) -> Self {
        Self {
            store,
            inbound: PrepareBuffer::new(),
            notify_enabled: false,
            ready: false,
            changed: false,
        }
    }

    pub fn into_shared(self) -> SharedChannel {
        Arc::new(Mutex::new(self))
    }

    /// Lock a shared channel, recovering from poisoning.
    pub fn lock(shared: &SharedChannel) -> MutexGuard<'_, ConfigChannel> {
        shared.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConfigStore {
        &mut self.store
    }

    /// Whether any `set` landed since creation.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn notify_enabled(&self) -> bool {
        self.notify_enabled
    }

    // ── Inbound ───────────────────────────────────────────────

    /// Plain write: prepare at `offset`, then commit.
    pub fn on_write(&mut self, offset: usize, data: &[u8]) -> Result<ChannelAction, BoundsError> {
        self.inbound.prepare(offset, data)?;
        Ok(self.execute())
    }

    pub fn on_prepare_write(&mut self, offset: usize, data: &[u8]) -> Result<(), BoundsError> {
        self.inbound.prepare(offset, data).inspect_err(|e| {
            warn!("CfgChannel: prepare rejected at {} (+{}): {}", offset, data.len(), e);
        })
    }

    /// Execute (`true`) or cancel (`false`) the prepared writes.
    pub fn on_execute_write(&mut self, execute: bool) -> ChannelAction {
        if execute {
            self.execute()
        } else {
            debug!("CfgChannel: prepared write cancelled");
            self.inbound.cancel();
            ChannelAction::Ignored
        }
    }

    fn execute(&mut self) -> ChannelAction {
        let raw = self.inbound.commit();
        match parse_command(&raw) {
            Command::Get => {
                self.store.restart();
                debug!("CfgChannel: disclosure restarted");
                ChannelAction::Restarted
            }
            Command::Set(payload) => match apply_set(&mut self.store, payload) {
                Some(id) => {
                    self.changed = true;
                    info!("CfgChannel: field '{}' set", id.key());
                    ChannelAction::Updated(id)
                }
                None => {
                    debug!("CfgChannel: set record discarded");
                    ChannelAction::Ignored
                }
            },
            Command::Exit => {
                info!("CfgChannel: exit requested");
                ChannelAction::ExitRequested
            }
            Command::Unknown => {
                warn!("CfgChannel: unknown command ({} bytes)", raw.len());
                ChannelAction::Ignored
            }
        }
    }

    // ── Outbound ──────────────────────────────────────────────

    /// Client configuration descriptor write.
    pub fn on_notify_config(&mut self, value: u16) {
        match value {
            CCC_NOTIFY_ENABLE => {
                self.notify_enabled = true;
                self.ready = true;
                self.store.restart();
                info!("CfgChannel: notifications enabled");
            }
            CCC_DISABLE => {
                self.notify_enabled = false;
                self.ready = false;
                info!("CfgChannel: notifications disabled");
            }
            other => warn!("CfgChannel: unsupported descriptor value {:#06x}", other),
        }
    }

    /// Peer acknowledged the last page.
    pub fn on_confirm(&mut self) {
        self.ready = true;
    }

    /// Pager step: the next page if notifications are on and the previous
    /// page was acknowledged.
    pub fn next_page(&mut self) -> Option<Page> {
        if !(self.notify_enabled && self.ready) {
            return None;
        }
        let page = self.store.read_chunk()?;
        self.ready = false;
        Some(page)
    }

    /// Direct characteristic read.
    pub fn on_read(&mut self) -> Option<Page> {
        self.store.read_chunk()
    }

    // ── Session ───────────────────────────────────────────────

    pub fn on_peer_connected(&mut self) {
        self.inbound.cancel();
        self.store.restart();
    }

    pub fn on_peer_disconnected(&mut self) {
        self.inbound.cancel();
        self.notify_enabled = false;
        self.ready = false;
    }
}
