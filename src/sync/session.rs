//! Per-connection bookkeeping owned by the worker.

use crate::wire::INITIAL_STAMP;

#[derive(Debug, Clone, Default)]
pub struct Session {
    session_id: Option<String>,
    pub consecutive_connect_errors: u32,
    pub consecutive_protocol_errors: u32,
    last_stamp: String,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_authorized(&self) -> bool {
        self.session_id.is_some()
    }

    /// Record a fresh session and restart message sync from the beginning.
    pub fn authorize(&mut self, id: &str) {
        self.session_id = Some(id.into());
        self.last_stamp.clear();
        self.last_stamp.push_str(INITIAL_STAMP);
        self.consecutive_protocol_errors = 0;
    }

    pub fn invalidate(&mut self) {
        self.session_id = None;
    }

    pub fn last_stamp(&self) -> &str {
        &self.last_stamp
    }

    /// Move the sync stamp forward; older or equal stamps are ignored.
    ///
    /// Stamps are fixed-format timestamps, so byte order is time order.
    pub fn advance_stamp(&mut self, stamp: &str) {
        if stamp > self.last_stamp.as_str() {
            self.last_stamp.clear();
            self.last_stamp.push_str(stamp);
        }
    }

    /// Back to the startup state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
