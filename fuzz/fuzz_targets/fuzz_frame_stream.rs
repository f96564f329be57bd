//! Fuzz target: `FrameStream` produce/confirm
//!
//! Drives the frame producer with fuzzer-chosen output sizes and flush
//! credits and asserts the bytes handed out are exactly the 6-byte header
//! followed by the payload, and that confirmation never runs ahead.
//!
//! cargo fuzz run fuzz_frame_stream

#![no_main]

use camsync::sync::stream::HEADER_LEN;
use camsync::sync::{FrameStream, Produce};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let cut = usize::from(split).min(rest.len());
    let (payload, script) = rest.split_at(cut);

    let mut fs = FrameStream::new();
    fs.load(payload.to_vec());

    let mut wire = Vec::new();
    let mut steps = script.iter().copied().cycle().take(8 * (payload.len() + HEADER_LEN) + 64);
    while !fs.is_finished() {
        let Some(step) = steps.next() else {
            break;
        };
        let mut out = vec![0u8; usize::from(step % 64) + 1];
        if let Produce::Data { len, .. } = fs.produce(&mut out) {
            wire.extend_from_slice(&out[..len]);
        }
        fs.confirm(usize::from(step >> 2) + 1);
        assert!(fs.sent_confirmed() <= fs.pos(), "confirmed past produced");
    }

    if fs.is_finished() {
        assert_eq!(wire.len(), HEADER_LEN + payload.len());
        assert_eq!(&wire[HEADER_LEN..], payload);
    }
});
