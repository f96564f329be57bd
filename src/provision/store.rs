//! Configuration field set with lazy serialization and paged reads.
//!
//! The blob is a sequence of single-key JSON records, one per field in id
//! order, each terminated by CR LF:
//!
//! ```text
//! {"u":"alice"}\r\n{"p":""}\r\n{"h":"cam.example"}\r\n ...
//! └──── record 0 ────┘└─ 1 ─┘  (write-only fields disclose "")
//! ```
//!
//! `record_start[i]` remembers where record `i` begins so that a change to
//! field `i` only truncates the tail and re-appends from there.

use log::{debug, warn};
use serde_json::{Map, Value};

/// Characteristic value length; a page carries one byte less (NUL).
pub const VALUE_MAX_LEN: usize = 21;

/// Bytes of blob per page.
pub const PAGE_LEN: usize = VALUE_MAX_LEN - 1;

const RECORD_TERMINATOR: &[u8] = b"\r\n";

// ───────────────────────────────────────────────────────────────
// Field schema
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    WriteOnly,
    ReadOnly,
}

impl Access {
    pub fn is_readable(self) -> bool {
        !matches!(self, Self::WriteOnly)
    }

    pub fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum FieldId {
    User = 0,
    Password = 1,
    Host = 2,
    NetworkId = 3,
    NetworkSecret = 4,
    DeviceName = 5,
}

impl FieldId {
    pub const COUNT: usize = 6;

    pub const ALL: [FieldId; Self::COUNT] = [
        Self::User,
        Self::Password,
        Self::Host,
        Self::NetworkId,
        Self::NetworkSecret,
        Self::DeviceName,
    ];

    /// Record key on the wire and in storage.
    pub const fn key(self) -> &'static str {
        match self {
            Self::User => "u",
            Self::Password => "p",
            Self::Host => "h",
            Self::NetworkId => "s",
            Self::NetworkSecret => "k",
            Self::DeviceName => "d",
        }
    }

    pub const fn access(self) -> Access {
        match self {
            Self::User | Self::Host | Self::NetworkId => Access::ReadWrite,
            Self::Password | Self::NetworkSecret => Access::WriteOnly,
            Self::DeviceName => Access::ReadOnly,
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.key() == key)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigField {
    pub id: FieldId,
    pub access: Access,
    pub value: String,
}

// ───────────────────────────────────────────────────────────────
// Store
// ───────────────────────────────────────────────────────────────

/// One outbound page: up to [`PAGE_LEN`] bytes followed by a NUL.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    buf: [u8; VALUE_MAX_LEN],
    len: usize,
}

impl Page {
    /// Page content without the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Page content including the trailing NUL.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.buf[..=self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    fields: [ConfigField; FieldId::COUNT],
    dirty: bool,
    dirty_from: usize,
    blob: Vec<u8>,
    record_start: [usize; FieldId::COUNT],
    cursor: usize,
    pass_consumed: bool,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    /// Every field present with an empty value; blob stale.
    pub fn new() -> Self {
        Self {
            fields: FieldId::ALL.map(|id| ConfigField {
                id,
                access: id.access(),
                value: String::new(),
            }),
            dirty: true,
            dirty_from: 0,
            blob: Vec::new(),
            record_start: [0; FieldId::COUNT],
            cursor: 0,
            pass_consumed: false,
        }
    }

    pub fn get(&self, id: FieldId) -> &str {
        &self.fields[id.index()].value
    }

    pub fn fields(&self) -> &[ConfigField] {
        &self.fields
    }

    /// Replace a value and mark the blob stale from this field on.
    pub fn set_field(&mut self, id: FieldId, value: &str) {
        let field = &mut self.fields[id.index()];
        field.value.clear();
        field.value.push_str(value);
        if self.dirty {
            self.dirty_from = self.dirty_from.min(id.index());
        } else {
            self.dirty = true;
            self.dirty_from = id.index();
        }
        debug!("CfgStore: '{}' updated, rebuild from {}", id.key(), self.dirty_from);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Serialize stale records.  No-op when clean.
    pub fn rebuild(&mut self) {
        if !self.dirty {
            return;
        }
        let from = self.dirty_from;
        let keep = if from == 0 { 0 } else { self.record_start[from] };
        self.blob.truncate(keep);

        for field in &self.fields[from..] {
            self.record_start[field.id.index()] = self.blob.len();
            let shown = if field.access.is_readable() {
                field.value.as_str()
            } else {
                ""
            };
            append_record(&mut self.blob, field.id.key(), shown);
        }

        self.dirty = false;
        self.dirty_from = FieldId::COUNT;
        self.cursor = 0;
        self.pass_consumed = false;
    }

    /// Serialized disclosure of the current state.
    pub fn blob(&mut self) -> &[u8] {
        self.rebuild();
        &self.blob
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Restart disclosure from the first byte.
    pub fn restart(&mut self) {
        self.cursor = 0;
        self.pass_consumed = false;
    }

    /// Next page of the blob, or `None` once per completed pass.
    ///
    /// The call that hands out the final bytes wraps the cursor back to 0;
    /// the following call reports nothing so the peer sees a pass boundary.
    pub fn read_chunk(&mut self) -> Option<Page> {
        self.rebuild();
        if self.pass_consumed || self.blob.is_empty() {
            self.restart();
            return None;
        }

        let mut page = Page {
            buf: [0; VALUE_MAX_LEN],
            len: 0,
        };
        let n = (self.blob.len() - self.cursor).min(PAGE_LEN);
        page.buf[..n].copy_from_slice(&self.blob[self.cursor..self.cursor + n]);
        page.len = n;
        self.cursor += n;

        if self.cursor == self.blob.len() {
            self.cursor = 0;
            self.pass_consumed = true;
        }
        Some(page)
    }

    // ── Persistence ───────────────────────────────────────────

    /// Stored form: JSON array of single-key records with real values.
    pub fn to_persisted(&self) -> Vec<u8> {
        let records: Vec<Value> = self
            .fields
            .iter()
            .map(|f| {
                let mut m = Map::new();
                m.insert(f.id.key().into(), Value::String(f.value.clone()));
                Value::Object(m)
            })
            .collect();
        serde_json::to_vec(&Value::Array(records)).unwrap_or_default()
    }

    /// Rebuild a store from its stored form.
    ///
    /// Ids missing from `bytes` keep an empty value, except the device name
    /// which falls back to `default_device`.  Unparsable input yields the
    /// defaults.
    pub fn from_persisted(bytes: &[u8], default_device: &str) -> Self {
        let mut store = Self::new();
        store.set_field(FieldId::DeviceName, default_device);

        let records = match serde_json::from_slice::<Vec<Map<String, Value>>>(bytes) {
            Ok(r) => r,
            Err(_) => {
                warn!("CfgStore: stored config unreadable, using defaults");
                return store;
            }
        };

        for id in FieldId::ALL {
            let found = records
                .iter()
                .find_map(|r| r.get(id.key()).and_then(Value::as_str));
            if let Some(v) = found {
                if id != FieldId::DeviceName || !v.is_empty() {
                    store.set_field(id, v);
                }
            }
        }
        store
    }
}

fn append_record(blob: &mut Vec<u8>, key: &str, value: &str) {
    let mut m = Map::new();
    m.insert(key.into(), Value::String(value.into()));
    // Serializing a string-only map cannot fail.
    if let Ok(bytes) = serde_json::to_vec(&Value::Object(m)) {
        blob.extend_from_slice(&bytes);
    }
    blob.extend_from_slice(RECORD_TERMINATOR);
}
