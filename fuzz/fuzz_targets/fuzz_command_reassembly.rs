//! Fuzz target: `ConfigChannel` prepared writes
//!
//! Interprets the input as a sequence of `(offset, len, bytes)` prepared
//! writes followed by an execute, and asserts the channel never panics,
//! never lets a `set` touch the read-only device name, and never discloses
//! a write-only value.
//!
//! cargo fuzz run fuzz_command_reassembly

#![no_main]

use camsync::provision::{ConfigChannel, ConfigStore, FieldId};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut store = ConfigStore::new();
    store.set_field(FieldId::DeviceName, "cam-fuzz");
    let mut channel = ConfigChannel::new(store);

    let mut rest = data;
    while rest.len() >= 2 {
        let offset = usize::from(rest[0]);
        let len = usize::from(rest[1]).min(rest.len() - 2);
        let piece = &rest[2..2 + len];
        // Rejections are expected; they must not disturb the buffer.
        let _ = channel.on_prepare_write(offset, piece);
        rest = &rest[2 + len..];
    }
    let _ = channel.on_execute_write(true);

    assert_eq!(channel.store().get(FieldId::DeviceName), "cam-fuzz");

    let secret = channel.store().get(FieldId::Password).to_owned();
    let mut pages = Vec::new();
    while let Some(page) = channel.on_read() {
        assert!(page.len() < 21, "page exceeds value size");
        pages.extend_from_slice(page.as_bytes());
    }
    if !secret.is_empty() {
        let text = String::from_utf8_lossy(&pages);
        assert!(text.contains("{\"p\":\"\"}"), "password placeholder missing");
    }
});
