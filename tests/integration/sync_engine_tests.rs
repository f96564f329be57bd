//! Integration tests for the sync worker against a scripted server.
//!
//! Drives [`SyncEngine::tick`] through connect, auth, fetch, delivery,
//! send, snapshot and probe with [`MockNet`] and [`MockDevice`], and checks
//! the failure policy (session loss, transport loss, protocol error valve,
//! connect backoff).

use camsync::app::events::AppEvent;
use camsync::config::SystemConfig;
use camsync::error::TransportError;
use camsync::pool::Message;
use camsync::scheduler::Scheduler;
use camsync::sync::engine::{IDLE_POLL_MS, YIELD_MS};
use camsync::sync::{Identity, Intent, IntentSet, SyncEngine, SyncHandle};
use serde_json::{Value, json};

use crate::mock_device::{MockDevice, RecordingSink};
use crate::mock_net::MockNet;

fn identity() -> Identity {
    Identity {
        host: "https://srv.example".into(),
        user: "alice".into(),
        password: "pw".into(),
        device: "cam1".into(),
        meta: None,
    }
}

struct Rig {
    engine: SyncEngine,
    handle: SyncHandle,
    net: MockNet,
    device: MockDevice,
    sink: RecordingSink,
}

impl Rig {
    fn with_config(config: SystemConfig) -> Self {
        let handle = SyncHandle::new();
        Self {
            engine: SyncEngine::new(config, identity(), handle.clone()),
            handle,
            net: MockNet::new(),
            device: MockDevice::new(),
            sink: RecordingSink::new(),
        }
    }

    fn new() -> Self {
        Self::with_config(SystemConfig::default())
    }

    /// Connected and authorized as `AB12`, first fetch done.
    fn authorized() -> Self {
        let mut rig = Self::new();
        rig.net.reply(r#"{"shash":"AB12"}"#);
        rig.tick();
        assert!(rig.handle.is_authorized());
        rig
    }

    fn tick(&mut self) {
        self.engine.tick(&mut self.net, &mut self.device, &mut self.sink);
    }

    fn run_once(&mut self, online: bool) {
        self.engine.run_once(online, &mut self.net, &mut self.device, &mut self.sink);
    }
}

fn body(rig: &Rig, index: usize) -> Value {
    serde_json::from_str(&rig.net.posts[index].body).unwrap()
}

// ── Connect and authorize ─────────────────────────────────────

#[test]
fn first_tick_connects_authorizes_and_fetches() {
    let mut rig = Rig::new();
    rig.net.reply(r#"{"shash":"AB12"}"#);

    rig.tick();

    assert!(rig.net.connected);
    assert_eq!(rig.net.paths(), vec!["/authorize.json", "/getMsgsAndSync.json"]);
    assert_eq!(
        body(&rig, 0),
        json!({"name": "alice", "pass": "pw", "device": "cam1"})
    );
    assert_eq!(body(&rig, 1), json!({"shash": "AB12", "stamp": ""}));
    assert_eq!(rig.engine.session().id(), Some("AB12"));
    assert!(rig.handle.pending().is_empty());
    assert_eq!(
        rig.sink.events[..2],
        [AppEvent::Connected, AppEvent::Authorized]
    );
}

#[test]
fn auth_without_session_id_keeps_auth_pending() {
    let mut rig = Rig::new();
    rig.net.reply(r#"{"result":"OK"}"#);

    rig.tick();

    assert!(rig.net.connected);
    assert!(!rig.handle.is_authorized());
    assert_eq!(rig.handle.pending(), IntentSet::only(Intent::Auth));
    assert_eq!(rig.engine.session().consecutive_protocol_errors, 1);
    assert_eq!(rig.net.paths(), vec!["/authorize.json"]);
}

#[test]
fn meta_is_sent_when_configured() {
    let handle = SyncHandle::new();
    let id = Identity {
        meta: Some("lab".into()),
        ..identity()
    };
    let mut engine = SyncEngine::new(SystemConfig::default(), id, handle);
    let mut net = MockNet::new();
    net.reply(r#"{"shash":"X"}"#);
    engine.tick(&mut net, &mut MockDevice::new(), &mut RecordingSink::new());

    let sent: Value = serde_json::from_str(&net.posts[0].body).unwrap();
    assert_eq!(sent["meta"], "lab");
}

// ── Failure policy ────────────────────────────────────────────

#[test]
fn no_such_session_leaves_only_auth() {
    let mut rig = Rig::authorized();
    rig.handle.set_intent(Intent::GetMessages);
    rig.handle.set_intent(Intent::SendSnapshot);
    rig.handle.set_intent(Intent::StreamFrame);
    rig.net.reply(r#"{"code":6}"#);

    rig.tick();

    assert_eq!(rig.handle.pending(), IntentSet::only(Intent::Auth));
    assert!(!rig.handle.is_authorized());
    assert!(rig.engine.session().id().is_none());
    assert!(rig.net.connected, "session loss keeps the transport");
    assert!(rig.sink.saw(&AppEvent::SessionLost));
    assert!(rig.device.captures.is_empty(), "tick stops after session loss");

    rig.net.reply(r#"{"shash":"CD34"}"#);
    rig.tick();
    assert_eq!(rig.engine.session().id(), Some("CD34"));
    assert_eq!(rig.net.connects, 1);
}

#[test]
fn protocol_errors_past_limit_force_disconnect() {
    let mut rig = Rig::new();
    rig.net.reply(r#"{"shash":"AB12"}"#);
    for _ in 0..11 {
        rig.net.reply(r#"{"result":"BAD"}"#);
    }
    rig.handle.push_outgoing(Message::new("btnevent"));

    // Tick 1 authorizes and takes the first BAD fetch.
    rig.tick();
    for _ in 0..9 {
        rig.handle.set_intent(Intent::GetMessages);
        rig.tick();
    }
    assert_eq!(rig.engine.session().consecutive_protocol_errors, 10);
    assert!(rig.net.connected, "ten errors are tolerated");

    rig.handle.set_intent(Intent::GetMessages);
    rig.handle.set_intent(Intent::Probe);
    rig.tick();

    assert!(!rig.net.connected);
    assert_eq!(rig.net.disconnects, 1);
    assert!(rig.handle.pending().is_empty());
    assert!(rig.handle.outgoing().is_empty());
    assert!(rig.handle.incoming().is_empty());
    assert!(!rig.handle.is_authorized());
    assert_eq!(rig.engine.session().consecutive_protocol_errors, 0);
    assert_eq!(rig.engine.session().last_stamp(), "");
    assert!(rig.sink.saw(&AppEvent::ForcedDisconnect));
}

#[test]
fn transport_error_drops_connection_and_keeps_work() {
    let mut rig = Rig::authorized();
    rig.handle.on_button(0);
    rig.handle.set_intent(Intent::SendSnapshot);
    rig.net.fail_post(TransportError::SendFailed);

    rig.tick();

    assert!(!rig.net.connected);
    assert!(!rig.engine.is_connected());
    assert!(rig.sink.saw(&AppEvent::Disconnected));
    assert_eq!(rig.handle.outgoing().len(), 1, "batch restored");
    assert!(rig.handle.has_intent(Intent::SendMessages));
    assert!(rig.handle.has_intent(Intent::SendSnapshot));
    assert!(rig.device.captures.is_empty(), "tick stops after transport loss");

    // Reconnect, re-auth, then the retained work goes out.
    rig.net.reply(r#"{"shash":"EF56"}"#);
    rig.tick();
    assert_eq!(rig.net.connects, 2);
    assert!(rig.handle.outgoing().is_empty());
    assert!(!rig.handle.has_intent(Intent::SendSnapshot));
    assert!(rig.net.paths().contains(&"/addRecord.json?shash=EF56"));
}

#[test]
fn connect_backoff_grows_then_caps() {
    let mut rig = Rig::new();
    rig.net.refuse_connects(12);

    for _ in 0..12 {
        rig.tick();
    }

    assert_eq!(
        rig.device.delays_ms,
        vec![1000, 2000, 3000, 4000, 5000, 6000, 7000, 8000, 9000, 10_000, 30_000, 30_000]
    );
    assert_eq!(rig.engine.session().consecutive_connect_errors, 12);
    assert!(rig.sink.saw(&AppEvent::ConnectFailed { errors: 3, retry_ms: 3000 }));
    assert!(rig.net.posts.is_empty());

    rig.net.reply(r#"{"shash":"AB12"}"#);
    rig.tick();
    assert!(rig.net.connected);
    assert_eq!(rig.engine.session().consecutive_connect_errors, 0);
    assert_eq!(rig.device.delays_ms.len(), 12, "no delay after success");
}

#[test]
fn oversized_reply_is_a_protocol_error() {
    let config = SystemConfig {
        response_initial_bytes: 16,
        response_max_bytes: 64,
        ..SystemConfig::default()
    };
    let mut rig = Rig::with_config(config);
    let big = format!(r#"{{"shash":"{}"}}"#, "Z".repeat(100));
    rig.net.reply(&big);

    rig.tick();

    assert!(!rig.handle.is_authorized());
    assert!(rig.handle.has_intent(Intent::Auth));
    assert_eq!(rig.engine.session().consecutive_protocol_errors, 1);
}

#[test]
fn steps_needing_a_session_wait_for_one() {
    let mut rig = Rig::authorized();
    rig.handle.set_intent(Intent::GetMessages);
    rig.net.reply(r#"{"code":6}"#);
    rig.tick();

    // Re-auth fails; snapshot must not go out without a session.
    rig.handle.set_intent(Intent::SendSnapshot);
    rig.net.reply(r#"{"result":"BAD"}"#);
    rig.tick();

    assert!(rig.handle.has_intent(Intent::SendSnapshot));
    assert!(!rig.net.paths().iter().any(|p| p.starts_with("/addRecord.json")));
    assert!(rig.device.captures.is_empty());
}

// ── Message exchange ──────────────────────────────────────────

#[test]
fn fetched_messages_are_dispatched_in_batches() {
    let mut rig = Rig::authorized();
    rig.handle.set_intent(Intent::Probe);
    rig.tick();
    assert_eq!(rig.handle.sensor_millivolts(), 1234);

    rig.handle.set_intent(Intent::GetMessages);
    rig.net.reply(
        &json!({
            "result": "OK",
            "msgs": [
                {"device": "phone", "msg": "dosnap", "stamp": "0001", "params": {"mid": 7}},
                {"device": "phone", "msg": "output", "stamp": "0002", "params": {"pin": 4, "level": 1, "mid": 8}},
                {"device": "phone", "msg": "getadcval", "stamp": "0003", "params": {"mid": 9}},
                {"device": "cam1", "msg": "dosnap", "stamp": "0004"}
            ]
        })
        .to_string(),
    );

    rig.tick();

    assert!(rig.sink.saw(&AppEvent::MessagesFetched { count: 4 }));
    assert_eq!(rig.device.outputs, vec![(4, true)]);
    assert_eq!(rig.handle.incoming().len(), 1, "batch of three per tick");

    let replies = rig.handle.outgoing().peek();
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0].kind, "dosnap");
    assert_eq!(replies[0].target.as_deref(), Some("phone"));
    assert_eq!(replies[0].params, Some(json!({"mid": 7, "result": "OK"})));
    assert_eq!(replies[1].params, Some(json!({"mid": 8, "result": "OK"})));
    assert_eq!(replies[2].kind, "adcval");
    assert_eq!(
        replies[2].params,
        Some(json!({"mid": 9, "adcval": 1234, "result": "OK"}))
    );
    assert!(
        !rig.handle.has_intent(Intent::SendMessages),
        "replies wait for the periodic send"
    );

    // dosnap armed the snapshot, which went out the same tick.
    assert_eq!(rig.device.captures.len(), 1);
    assert!(rig.net.paths().contains(&"/addRecord.json?shash=AB12"));

    // Our own message is dropped without a reply.
    rig.tick();
    assert!(rig.handle.incoming().is_empty());
    assert_eq!(rig.handle.outgoing().len(), 3);

    // The next fetch continues from the newest stamp.
    rig.handle.set_intent(Intent::GetMessages);
    rig.tick();
    let last = rig.net.last_post().unwrap();
    assert_eq!(last.path, "/getMsgsAndSync.json");
    let sent: Value = serde_json::from_str(&last.body).unwrap();
    assert_eq!(sent["stamp"], "0004");
}

#[test]
fn unknown_output_pin_replies_bad() {
    let mut rig = Rig::authorized();
    rig.handle.set_intent(Intent::GetMessages);
    rig.net.reply(
        r#"{"msgs":[{"device":"phone","msg":"output","params":{"pin":99,"level":1}}]}"#,
    );

    rig.tick();

    let replies = rig.handle.outgoing().peek();
    assert_eq!(replies[0].params, Some(json!({"result": "BAD"})));
    assert!(rig.device.outputs.is_empty());
}

#[test]
fn failed_send_restores_batch_in_order() {
    let mut rig = Rig::authorized();
    rig.handle.on_button(0);
    rig.handle.on_button(1);
    rig.net.reply(r#"{"result":"BAD"}"#);

    rig.tick();

    let kept = rig.handle.outgoing().peek();
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].params, Some(json!({"btn": "btn1"})));
    assert_eq!(kept[1].params, Some(json!({"btn": "btn2"})));
    assert!(rig.handle.has_intent(Intent::SendMessages));
    assert!(rig.net.connected, "a protocol error keeps the connection");

    rig.tick();

    assert!(rig.handle.outgoing().is_empty());
    assert!(!rig.handle.has_intent(Intent::SendMessages));
    assert!(rig.sink.saw(&AppEvent::MessagesSent { count: 2 }));
    let last = rig.net.last_post().unwrap();
    assert_eq!(last.path, "/addMsgs.json");
    let sent: Value = serde_json::from_str(&last.body).unwrap();
    assert_eq!(
        sent,
        json!({
            "shash": "AB12",
            "msgs": [
                {"msg": "btnevent", "params": {"btn": "btn1"}},
                {"msg": "btnevent", "params": {"btn": "btn2"}}
            ]
        })
    );
}

#[test]
fn empty_send_clears_the_bit_without_a_request() {
    let mut rig = Rig::authorized();
    let before = rig.net.posts.len();
    rig.handle.set_intent(Intent::SendMessages);

    rig.tick();

    assert!(!rig.handle.has_intent(Intent::SendMessages));
    assert_eq!(rig.net.posts.len(), before);
}

// ── Snapshot and probe ────────────────────────────────────────

#[test]
fn snapshot_uploads_frame_body() {
    let mut rig = Rig::authorized();
    rig.device.frame_len = 40;
    rig.handle.set_intent(Intent::SendSnapshot);

    rig.tick();

    let last = rig.net.last_post().unwrap();
    assert_eq!(last.path, "/addRecord.json?shash=AB12");
    assert_eq!(last.body.len(), 40);
    assert!(rig.sink.saw(&AppEvent::SnapshotUploaded { bytes: 40 }));
    assert!(!rig.handle.has_intent(Intent::SendSnapshot));
}

#[test]
fn snapshot_capture_failure_retries_next_tick() {
    let mut rig = Rig::authorized();
    rig.device.fail_captures = 1;
    rig.handle.set_intent(Intent::SendSnapshot);

    rig.tick();
    assert!(rig.handle.has_intent(Intent::SendSnapshot));

    rig.tick();
    assert!(!rig.handle.has_intent(Intent::SendSnapshot));
    assert_eq!(rig.device.captures.len(), 2);
}

#[test]
fn probe_waits_for_connection() {
    let mut rig = Rig::new();
    rig.net.refuse_connects(1);
    rig.device.probe_mv = 812;
    rig.handle.set_intent(Intent::Probe);

    rig.tick();

    assert!(!rig.net.connected);
    assert!(rig.handle.has_intent(Intent::Probe), "probe waits for the connection");

    rig.net.reply(r#"{"shash":"AB12"}"#);
    rig.tick();
    assert_eq!(rig.handle.sensor_millivolts(), 812);
    assert!(!rig.handle.has_intent(Intent::Probe));
}

// ── Scheduler ─────────────────────────────────────────────────

#[test]
fn scheduler_arms_session_work_only_when_authorized() {
    let config = SystemConfig::default();
    let mut scheduler = Scheduler::for_sync(&config);
    let mut rig = Rig::new();
    let mut delegate = rig.handle.clone();

    scheduler.tick(5000, &mut delegate);
    assert_eq!(rig.handle.pending(), IntentSet::only(Intent::Probe));

    rig.handle.clear_intent(Intent::Probe);
    rig.net.reply(r#"{"shash":"AB12"}"#);
    rig.tick();
    assert!(rig.handle.pending().is_empty());

    scheduler.tick(5000, &mut delegate);
    let pending = rig.handle.pending();
    for intent in [Intent::GetMessages, Intent::SendMessages, Intent::StreamFrame, Intent::Probe] {
        assert!(pending.contains(intent), "{intent:?} should be armed");
    }
}

// ── Worker pacing ─────────────────────────────────────────────

#[test]
fn offline_pass_parks_with_work_pending() {
    let mut rig = Rig::new();
    rig.handle.set_intent(Intent::Probe);

    for _ in 0..3 {
        rig.run_once(false);
    }

    assert_eq!(rig.net.connects, 0);
    assert_eq!(rig.device.delays_ms, vec![IDLE_POLL_MS; 3]);
    assert!(rig.handle.has_intent(Intent::Probe));
}

#[test]
fn failing_snapshot_still_yields_every_pass() {
    let mut rig = Rig::authorized();
    rig.device.delays_ms.clear();
    rig.device.fail_captures = 2;
    rig.handle.set_intent(Intent::SendSnapshot);

    rig.run_once(true);
    rig.run_once(true);
    assert_eq!(rig.device.delays_ms, vec![YIELD_MS, YIELD_MS]);
    assert!(rig.handle.has_intent(Intent::SendSnapshot));

    rig.run_once(true);
    assert!(!rig.handle.has_intent(Intent::SendSnapshot));
    assert_eq!(rig.device.delays_ms.last(), Some(&IDLE_POLL_MS));
}
