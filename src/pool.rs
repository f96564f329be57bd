//! Incoming and outgoing message pools.
//!
//! Each pool is an ordered sequence of [`Message`]s behind its own mutex.
//! Timers and GATT callbacks push into the outgoing pool while the worker
//! is mid-request, so the worker never holds the lock across I/O: it
//! *drains* a batch, transmits it, and on failure *restores* it in front of
//! whatever arrived meanwhile.
//!
//! ```text
//!   live:  [a b c]            drain ──▶ batch [a b c], live []
//!   live:  [d]                (d pushed during transmission)
//!   fail:  restore(batch) ──▶ live [a b c d]
//! ```

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One server message, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message kind (`"dosnap"`, `"output"`, ...).
    #[serde(rename = "msg")]
    pub kind: String,
    /// Recipient device name; omitted for broadcasts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Sender device name, set by the server on incoming messages.
    #[serde(rename = "device", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Server timestamp, incoming only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Message {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.into(),
            target: None,
            source: None,
            stamp: None,
            params: None,
        }
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Look up a field of `params`.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.as_ref().and_then(|p| p.get(key))
    }
}

/// A mutex-guarded ordered message sequence.
#[derive(Debug, Default)]
pub struct MessagePool {
    inner: Mutex<Vec<Message>>,
}

impl MessagePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the pool for a compound operation.
    ///
    /// A poisoned lock is recovered: the pool holds plain data and every
    /// mutation below leaves it consistent.
    pub fn lock(&self) -> MutexGuard<'_, Vec<Message>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Append one message at the back.
    pub fn push(&self, msg: Message) {
        self.lock().push(msg);
    }

    /// Copy of the current contents, in order.
    pub fn peek(&self) -> Vec<Message> {
        self.lock().clone()
    }

    /// Replace the whole contents.  Previous messages are discarded.
    pub fn replace(&self, msgs: Vec<Message>) {
        *self.lock() = msgs;
    }

    /// Take the whole contents, leaving the pool empty.
    pub fn drain(&self) -> Vec<Message> {
        core::mem::take(&mut *self.lock())
    }

    /// Take up to `n` messages from the front.
    pub fn take_front(&self, n: usize) -> Vec<Message> {
        let mut guard = self.lock();
        let n = n.min(guard.len());
        guard.drain(..n).collect()
    }

    /// Put a previously drained batch back in front of newer messages.
    pub fn restore(&self, batch: Vec<Message>) {
        if batch.is_empty() {
            return;
        }
        let mut guard = self.lock();
        let newer = core::mem::replace(&mut *guard, batch);
        guard.extend(newer);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
