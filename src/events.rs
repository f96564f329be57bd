//! Interrupt-driven device event queue.
//!
//! Events are produced by:
//! - GPIO ISRs (button presses)
//! - GATT callbacks (config peer connect/disconnect, exit command)
//!
//! Events are consumed by the main loop, which drains them once per pass.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ GPIO ISR    │────▶│  Event Queue │────▶│  Main Loop   │
//! │ GATT cb     │────▶│  (lock-free) │     │  (consumer)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

/// Maximum number of pending events.
/// Power of 2 for efficient ring buffer modulo.
const EVENT_QUEUE_CAP: usize = 32;

const RAW_BUTTON_BASE: u8 = 0;
const RAW_BUTTON_MAX: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // ── User input ────────────────────────────────────────
    /// Debounced press on button `n` (0-based).
    ButtonPressed(u8),

    // ── Configuration channel ─────────────────────────────
    ConfigPeerConnected,
    ConfigPeerDisconnected,
    /// Peer sent `*cmd*exit`.
    ConfigExitRequested,
}

impl Event {
    fn to_u8(self) -> Option<u8> {
        match self {
            Self::ButtonPressed(n) if n <= RAW_BUTTON_MAX - RAW_BUTTON_BASE => {
                Some(RAW_BUTTON_BASE + n)
            }
            Self::ButtonPressed(_) => None,
            Self::ConfigPeerConnected => Some(20),
            Self::ConfigPeerDisconnected => Some(21),
            Self::ConfigExitRequested => Some(22),
        }
    }

    fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            RAW_BUTTON_BASE..=RAW_BUTTON_MAX => Some(Self::ButtonPressed(raw - RAW_BUTTON_BASE)),
            20 => Some(Self::ConfigPeerConnected),
            21 => Some(Self::ConfigPeerDisconnected),
            22 => Some(Self::ConfigExitRequested),
            _ => None,
        }
    }
}

// ── Lock-free SPSC ring buffer ────────────────────────────────
//
// ISRs write (produce), main loop reads (consume).  Slots are atomics, so
// the static needs no `unsafe`.

static EVENT_HEAD: AtomicU8 = AtomicU8::new(0);
static EVENT_TAIL: AtomicU8 = AtomicU8::new(0);
static EVENT_BUFFER: [AtomicU8; EVENT_QUEUE_CAP] = [const { AtomicU8::new(0) }; EVENT_QUEUE_CAP];

/// Push an event into the queue.
/// Safe to call from ISR context (lock-free).
/// Returns `false` if the queue is full (event dropped).
pub fn push_event(event: Event) -> bool {
    let Some(raw) = event.to_u8() else {
        return false;
    };
    let head = EVENT_HEAD.load(Ordering::Relaxed);
    let tail = EVENT_TAIL.load(Ordering::Acquire);
    let next_head = (head + 1) % EVENT_QUEUE_CAP as u8;

    if next_head == tail {
        return false; // Queue full, drop event.
    }

    EVENT_BUFFER[head as usize].store(raw, Ordering::Relaxed);
    EVENT_HEAD.store(next_head, Ordering::Release);
    true
}

/// Pop the next event from the queue.
/// Called from the main loop (single consumer).
pub fn pop_event() -> Option<Event> {
    loop {
        let tail = EVENT_TAIL.load(Ordering::Relaxed);
        let head = EVENT_HEAD.load(Ordering::Acquire);

        if tail == head {
            return None;
        }

        let raw = EVENT_BUFFER[tail as usize].load(Ordering::Relaxed);
        EVENT_TAIL.store((tail + 1) % EVENT_QUEUE_CAP as u8, Ordering::Release);

        if let Some(event) = Event::from_u8(raw) {
            return Some(event);
        }
    }
}

/// Drain all pending events into a callback, in FIFO order.
pub fn drain_events(mut handler: impl FnMut(Event)) {
    while let Some(event) = pop_event() {
        handler(event);
    }
}

/// Number of pending events.
pub fn queue_len() -> usize {
    let head = EVENT_HEAD.load(Ordering::Relaxed) as usize;
    let tail = EVENT_TAIL.load(Ordering::Relaxed) as usize;
    (head + EVENT_QUEUE_CAP - tail) % EVENT_QUEUE_CAP
}
