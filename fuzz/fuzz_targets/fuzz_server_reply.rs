//! Fuzz target: server reply handling
//!
//! Feeds arbitrary bytes through `ResponseBuffer` in uneven fragments and
//! into `ServerReply` parsing, classification and message extraction.  None
//! of it may panic, and the buffer must stay under its ceiling.
//!
//! cargo fuzz run fuzz_server_reply

#![no_main]

use camsync::buffer::ResponseBuffer;
use camsync::wire::ServerReply;
use libfuzzer_sys::fuzz_target;

const MAX: usize = 4096;

fuzz_target!(|data: &[u8]| {
    let mut response = ResponseBuffer::new(64, MAX);
    let step = data.first().map_or(1, |&b| usize::from(b % 97) + 1);
    for fragment in data.chunks(step) {
        let _ = response.append(fragment);
    }
    assert!(response.len() < MAX, "response grew past its ceiling");

    if let Ok(mut reply) = ServerReply::parse(response.as_slice()) {
        let _ = reply.check();
        let _ = reply.session_id().map(str::len);
        for msg in reply.take_messages() {
            // Extracted messages re-encode cleanly for the outgoing pool.
            assert!(serde_json::to_vec(&msg).is_ok());
        }
    }
});
