//! ISR-debounced user buttons.
//!
//! ## Hardware
//!
//! Two active-high momentary switches.  The GPIO fires on the rising edge;
//! the ISR drops edges closer than [`DEBOUNCE_MS`] to the last accepted one
//! and pushes [`Event::ButtonPressed`] into the event queue.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::events::{Event, push_event};

pub const BUTTON_COUNT: usize = 2;
pub const DEBOUNCE_MS: u32 = 200;

/// Last accepted press per button (milliseconds since boot, truncated).
/// Zero means never pressed.
static LAST_PRESS_MS: [AtomicU32; BUTTON_COUNT] = [const { AtomicU32::new(0) }; BUTTON_COUNT];

/// Wire name of button `index` in `btnevent` messages.
pub fn button_name(index: u8) -> Option<&'static str> {
    match index {
        0 => Some("btn1"),
        1 => Some("btn2"),
        _ => None,
    }
}

/// Debounce decision for an edge at `now_ms`.  Records the press when
/// accepted.
fn accept_press(index: usize, now_ms: u32) -> bool {
    let Some(slot) = LAST_PRESS_MS.get(index) else {
        return false;
    };
    let last = slot.load(Ordering::Acquire);
    if last != 0 && now_ms.wrapping_sub(last) < DEBOUNCE_MS {
        return false;
    }
    slot.store(now_ms.max(1), Ordering::Release);
    true
}

/// ISR handler, register this on each button GPIO rising edge.
/// Safe to call from interrupt context (lock-free).
pub fn button_isr_handler(index: u8, now_ms: u32) {
    if accept_press(usize::from(index), now_ms) {
        push_event(Event::ButtonPressed(index));
    }
}
