//! Integration tests for frame streaming through the sync worker.
//!
//! The mock transport flushes a configurable number of bytes per call, so
//! these cover write-through, partial flushes with resume rounds, and a
//! stalled peer.

use camsync::app::events::AppEvent;
use camsync::app::ports::CaptureMode;
use camsync::config::SystemConfig;
use camsync::error::TransportError;
use camsync::sync::stream::{FRAME_MAGIC, FrameStreamer, HEADER_LEN};
use camsync::sync::{Identity, Intent, SyncEngine, SyncHandle};

use crate::mock_device::{MockDevice, RecordingSink};
use crate::mock_net::MockNet;

fn authorized_rig(config: SystemConfig) -> (SyncEngine, SyncHandle, MockNet, MockDevice, RecordingSink) {
    let handle = SyncHandle::new();
    let identity = Identity {
        host: "https://srv.example".into(),
        user: "alice".into(),
        device: "cam1".into(),
        ..Default::default()
    };
    let mut engine = SyncEngine::new(config, identity, handle.clone());
    let mut net = MockNet::new();
    let mut device = MockDevice::new();
    let mut sink = RecordingSink::new();
    net.reply(r#"{"shash":"AB12"}"#);
    engine.tick(&mut net, &mut device, &mut sink);
    assert!(handle.is_authorized());
    (engine, handle, net, device, sink)
}

fn expected_wire(frame: &[u8]) -> Vec<u8> {
    let mut wire = FRAME_MAGIC.to_le_bytes().to_vec();
    wire.extend_from_slice(&(frame.len() as u32).to_le_bytes());
    wire.extend_from_slice(frame);
    wire
}

#[test]
fn frame_goes_out_with_header() {
    let (mut engine, handle, mut net, mut device, mut sink) = authorized_rig(SystemConfig::default());
    handle.set_intent(Intent::StreamFrame);

    engine.tick(&mut net, &mut device, &mut sink);

    assert_eq!(
        net.opened,
        vec!["/addStream.json?shash=AB12&subproto=RAW_JPEG&delta=1000".to_owned()]
    );
    assert_eq!(device.captures, vec![CaptureMode::Stream]);
    assert_eq!(net.streamed, expected_wire(&device.frame()));
    assert_eq!(&net.streamed[..HEADER_LEN], &[0xAA, 0xAA, 100, 0, 0, 0]);
    assert!(sink.saw(&AppEvent::FrameStreamed { bytes: HEADER_LEN + 100 }));
    assert!(!handle.has_intent(Intent::StreamFrame));
}

#[test]
fn stream_is_reused_across_frames() {
    let (mut engine, handle, mut net, mut device, mut sink) = authorized_rig(SystemConfig::default());

    for _ in 0..3 {
        handle.set_intent(Intent::StreamFrame);
        engine.tick(&mut net, &mut device, &mut sink);
    }

    assert_eq!(net.opened.len(), 1);
    let one = expected_wire(&device.frame());
    assert_eq!(net.streamed, [one.clone(), one.clone(), one].concat());
}

#[test]
fn partial_flushes_complete_through_resume() {
    let (mut engine, handle, mut net, mut device, mut sink) = authorized_rig(SystemConfig::default());
    net.chunk = 32;
    net.flush_per_call = 10;
    device.frame_len = 300;
    handle.set_intent(Intent::StreamFrame);

    engine.tick(&mut net, &mut device, &mut sink);

    assert_eq!(net.streamed, expected_wire(&device.frame()));
    assert!(!handle.has_intent(Intent::StreamFrame));
    assert!(net.connected);
}

#[test]
fn stalled_stream_tears_down_and_disconnects() {
    let config = SystemConfig {
        stream_stall_limit: 3,
        ..SystemConfig::default()
    };
    let (mut engine, handle, mut net, mut device, mut sink) = authorized_rig(config);
    net.flush_per_call = 0;
    handle.set_intent(Intent::StreamFrame);

    engine.tick(&mut net, &mut device, &mut sink);

    assert_eq!(net.closed, vec![1]);
    assert!(!net.connected);
    assert!(sink.saw(&AppEvent::Disconnected));
    assert!(handle.has_intent(Intent::StreamFrame), "frame retried after reconnect");

    // After reconnecting a fresh stream is opened.
    net.flush_per_call = usize::MAX;
    net.reply(r#"{"shash":"CD34"}"#);
    engine.tick(&mut net, &mut device, &mut sink);
    assert_eq!(net.opened.len(), 2);
    assert!(net.opened[1].contains("shash=CD34"));
    assert!(!handle.has_intent(Intent::StreamFrame));
}

#[test]
fn go_away_mid_frame_tears_down_and_disconnects() {
    let (mut engine, handle, mut net, mut device, mut sink) = authorized_rig(SystemConfig::default());
    net.chunk = 64;
    device.frame_len = 1000;
    net.fail_send(3, TransportError::GoAway);
    handle.set_intent(Intent::StreamFrame);

    engine.tick(&mut net, &mut device, &mut sink);

    assert_eq!(net.sends, 3);
    assert_eq!(net.closed, vec![1]);
    assert!(!engine.is_connected());
    assert!(!net.connected);
    assert!(sink.saw(&AppEvent::Disconnected));
    assert!(handle.has_intent(Intent::StreamFrame), "frame retried after reconnect");
}

#[test]
fn stream_capture_failure_drops_the_frame() {
    let (mut engine, handle, mut net, mut device, mut sink) = authorized_rig(SystemConfig::default());
    device.fail_captures = 1;
    handle.set_intent(Intent::StreamFrame);

    engine.tick(&mut net, &mut device, &mut sink);

    assert!(!handle.has_intent(Intent::StreamFrame));
    assert!(net.opened.is_empty());
    assert!(net.connected);
}

#[test]
fn streamer_reopens_after_teardown() {
    let mut net = MockNet::new();
    net.connected = true;
    let mut streamer = FrameStreamer::new(5);

    assert_eq!(streamer.push(&mut net, "/s", vec![1, 2, 3]), Ok(HEADER_LEN + 3));
    assert!(streamer.is_open());
    streamer.teardown(&mut net);
    assert!(!streamer.is_open());
    assert_eq!(net.closed, vec![1]);

    assert_eq!(streamer.push(&mut net, "/s", vec![4]), Ok(HEADER_LEN + 1));
    assert_eq!(net.opened.len(), 2);
}
