//! Request/response transfer buffers.
//!
//! ```text
//!   OutboundBody ──fill()──▶ transport ──append()──▶ ResponseBuffer
//!   (borrowed bytes + pos)                          (growable, capped)
//! ```
//!
//! Both live only for the duration of one exchange.  The transport pulls
//! request bytes with [`OutboundBody::fill`] and pushes response bytes with
//! [`ResponseBuffer::append`]; neither hands out raw pointers.

use log::warn;

/// Response capacity grows in steps of this many bytes.
const GROWTH_STEP: usize = 1024;

// ───────────────────────────────────────────────────────────────
// Response accumulation
// ───────────────────────────────────────────────────────────────

/// Growable response buffer with a hard ceiling.
///
/// Capacity starts at `initial` and is rounded up to the next
/// [`GROWTH_STEP`] multiple as data arrives, never beyond `max`.  Data that
/// would not fit is dropped and the buffer is flagged as overflowed.
#[derive(Debug)]
pub struct ResponseBuffer {
    data: Vec<u8>,
    capacity: usize,
    max: usize,
    overflowed: bool,
}

impl ResponseBuffer {
    pub fn new(initial: usize, max: usize) -> Self {
        let capacity = initial.min(max);
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            max,
            overflowed: false,
        }
    }

    /// Append a received fragment.
    ///
    /// Returns `false` (and drops the fragment) when it cannot fit under
    /// the ceiling.
    pub fn append(&mut self, fragment: &[u8]) -> bool {
        if fragment.is_empty() {
            return true;
        }
        let needed = self.data.len() + fragment.len();
        if needed >= self.capacity {
            if needed >= self.max {
                warn!(
                    "ResponseBuffer: overflow ({} + {} bytes, max {})",
                    self.data.len(),
                    fragment.len(),
                    self.max
                );
                self.overflowed = true;
                return false;
            }
            let grown = ((needed / GROWTH_STEP + 1) * GROWTH_STEP).min(self.max);
            self.data.reserve_exact(grown - self.data.len());
            self.capacity = grown;
        }
        self.data.extend_from_slice(fragment);
        true
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Logical capacity (the growth policy's view, not the allocator's).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Rewind the write cursor, keeping the grown capacity.
    pub fn clear(&mut self) {
        self.data.clear();
        self.overflowed = false;
    }
}

// ───────────────────────────────────────────────────────────────
// Request staging
// ───────────────────────────────────────────────────────────────

/// Borrowed request body with a read cursor.
#[derive(Debug)]
pub struct OutboundBody<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> OutboundBody<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Copy the next bytes into `out`.
    ///
    /// Returns `(copied, eof)`; `eof` is set once the whole body has been
    /// handed out, including on the call that copies the final bytes.
    pub fn fill(&mut self, out: &mut [u8]) -> (usize, bool) {
        let remaining = &self.bytes[self.pos..];
        let n = remaining.len().min(out.len());
        out[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        (n, self.pos == self.bytes.len())
    }

    /// Total body length.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}
