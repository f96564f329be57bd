//! Sync worker: one connection, driven by intent bits.
//!
//! ```text
//!   timers / GATT / buttons ──SyncHandle──▶ ┌──────────────────┐
//!        (set bits, push msgs)              │ intents  (Mutex) │
//!                                           │ incoming (Mutex) │
//!                                           │ outgoing (Mutex) │
//!                                           └────────┬─────────┘
//!                                                    │ tick()
//!                                                    ▼
//!   connect → auth → fetch → deliver → send → snapshot → stream → probe
//! ```
//!
//! Only the worker performs I/O.  No lock is held across a request.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::json;

use super::handlers::{self, KIND_BUTTON};
use super::intents::{Intent, IntentSet};
use super::session::Session;
use super::stream::FrameStreamer;
use crate::app::events::AppEvent;
use crate::app::ports::{
    BoardPort, CameraPort, CaptureMode, EventSink, Exchange, SchedulerDelegate, StreamTransport,
};
use crate::buffer::{OutboundBody, ResponseBuffer};
use crate::config::SystemConfig;
use crate::drivers::button::button_name;
use crate::error::{Error, ProtocolError};
use crate::pool::{Message, MessagePool};
use crate::wire::{self, AddMsgsRequest, AuthRequest, GetMsgsRequest, ServerReply};

/// Worker park time when offline or idle.
pub const IDLE_POLL_MS: u32 = 10;
/// Worker park time between passes while work is pending.
pub const YIELD_MS: u32 = 1;

// ───────────────────────────────────────────────────────────────
// Shared state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Shared {
    intents: Mutex<IntentSet>,
    incoming: MessagePool,
    outgoing: MessagePool,
    authorized: AtomicBool,
    sensor_mv: AtomicU32,
}

/// Cloneable producer-side view of the sync state.
#[derive(Debug, Clone, Default)]
pub struct SyncHandle(Arc<Shared>);

impl SyncHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn intents(&self) -> MutexGuard<'_, IntentSet> {
        self.0
            .intents
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn set_intent(&self, intent: Intent) {
        self.intents().set(intent);
    }

    pub fn clear_intent(&self, intent: Intent) {
        self.intents().clear(intent);
    }

    pub fn has_intent(&self, intent: Intent) -> bool {
        self.intents().contains(intent)
    }

    /// Copy of the current bits.
    pub fn pending(&self) -> IntentSet {
        *self.intents()
    }

    fn replace_intents(&self, set: IntentSet) {
        *self.intents() = set;
    }

    pub fn incoming(&self) -> &MessagePool {
        &self.0.incoming
    }

    pub fn outgoing(&self) -> &MessagePool {
        &self.0.outgoing
    }

    /// Queue a message for the next send.
    pub fn push_outgoing(&self, msg: Message) {
        self.0.outgoing.push(msg);
    }

    /// Report a button press (`index` 0 or 1) and arm a send.
    pub fn on_button(&self, index: u8) {
        let Some(name) = button_name(index) else {
            warn!("Sync: press on unknown button {}", index);
            return;
        };
        self.push_outgoing(Message::new(KIND_BUTTON).with_params(json!({ "btn": name })));
        self.set_intent(Intent::SendMessages);
    }

    pub fn is_authorized(&self) -> bool {
        self.0.authorized.load(Ordering::Acquire)
    }

    fn set_authorized(&self, v: bool) {
        self.0.authorized.store(v, Ordering::Release);
    }

    pub fn sensor_millivolts(&self) -> u32 {
        self.0.sensor_mv.load(Ordering::Relaxed)
    }

    pub fn store_sensor_millivolts(&self, mv: u32) {
        self.0.sensor_mv.store(mv, Ordering::Relaxed);
    }
}

impl SchedulerDelegate for SyncHandle {
    fn session_ready(&self) -> bool {
        self.is_authorized()
    }

    fn on_schedule_fired(&mut self, label: &str, intent: Intent) {
        debug!("Sync: '{}' fired", label);
        self.set_intent(intent);
    }
}

// ───────────────────────────────────────────────────────────────
// Identity
// ───────────────────────────────────────────────────────────────

/// Who we are and where we connect.
#[derive(Clone, Default)]
pub struct Identity {
    pub host: String,
    pub user: String,
    pub password: String,
    pub device: String,
    pub meta: Option<String>,
}

impl core::fmt::Debug for Identity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Identity")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"***")
            .field("device", &self.device)
            .field("meta", &self.meta)
            .finish()
    }
}

// ───────────────────────────────────────────────────────────────
// Engine
// ───────────────────────────────────────────────────────────────

pub struct SyncEngine {
    config: SystemConfig,
    identity: Identity,
    handle: SyncHandle,
    session: Session,
    connected: bool,
    streamer: FrameStreamer,
}

impl SyncEngine {
    pub fn new(config: SystemConfig, identity: Identity, handle: SyncHandle) -> Self {
        let streamer = FrameStreamer::new(config.stream_stall_limit);
        Self {
            config,
            identity,
            handle,
            session: Session::new(),
            connected: false,
            streamer,
        }
    }

    pub fn handle(&self) -> &SyncHandle {
        &self.handle
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Run every due step once, in fixed order.
    ///
    /// `device` also provides the delay used for connect backoff.
    pub fn tick(
        &mut self,
        net: &mut (impl Exchange + StreamTransport),
        device: &mut (impl CameraPort + BoardPort + DelayNs),
        sink: &mut impl EventSink,
    ) {
        if !self.connected {
            self.handle.set_intent(Intent::Connect);
        }

        if self.due(Intent::Connect) {
            self.step_connect(net, device, sink);
        }

        if self.due(Intent::Auth) {
            let r = self.step_auth(net, sink);
            if !self.settle(r, net, sink) {
                return;
            }
        }

        if self.due(Intent::GetMessages) {
            let r = self.step_get_messages(net, sink);
            if !self.settle(r, net, sink) {
                return;
            }
        }

        if self.connected {
            self.deliver_incoming(device);
        }

        if self.due(Intent::SendMessages) {
            let r = self.step_send_messages(net, sink);
            if !self.settle(r, net, sink) {
                return;
            }
        }

        if self.due(Intent::SendSnapshot) {
            let r = self.step_snapshot(net, device, sink);
            if !self.settle(r, net, sink) {
                return;
            }
        }

        if self.due(Intent::StreamFrame) {
            let r = self.step_stream(net, device, sink);
            if !self.settle(r, net, sink) {
                return;
            }
        }

        if self.due(Intent::Probe) {
            let mv = device.sample_millivolts();
            self.handle.store_sensor_millivolts(mv);
            self.handle.clear_intent(Intent::Probe);
        }
    }

    /// One worker pass: tick while `online`, then park.
    ///
    /// Every pass parks, so bits that cannot clear (offline, or a step
    /// that keeps failing) never spin the worker.
    pub fn run_once(
        &mut self,
        online: bool,
        net: &mut (impl Exchange + StreamTransport),
        device: &mut (impl CameraPort + BoardPort + DelayNs),
        sink: &mut impl EventSink,
    ) {
        if online {
            self.tick(net, device, sink);
        }
        let busy = online && !self.handle.pending().is_empty();
        device.delay_ms(if busy { YIELD_MS } else { IDLE_POLL_MS });
    }

    /// Bit set and, beyond `Connect`, a live connection.
    fn due(&self, intent: Intent) -> bool {
        self.handle.has_intent(intent) && (intent == Intent::Connect || self.connected)
    }

    // ── Steps ─────────────────────────────────────────────────

    fn step_connect(
        &mut self,
        net: &mut impl Exchange,
        delay: &mut impl DelayNs,
        sink: &mut impl EventSink,
    ) {
        match net.connect(&self.identity.host) {
            Ok(()) => {
                self.connected = true;
                self.session.consecutive_connect_errors = 0;
                self.handle.clear_intent(Intent::Connect);
                self.handle.set_intent(Intent::Auth);
                info!("Sync: connected to {}", self.identity.host);
                sink.emit(&AppEvent::Connected);
            }
            Err(e) => {
                self.session.consecutive_connect_errors += 1;
                let errors = self.session.consecutive_connect_errors;
                let retry_ms = self.config.backoff_delay_ms(errors);
                warn!("Sync: connect failed ({}), attempt {}", e, errors);
                sink.emit(&AppEvent::ConnectFailed { errors, retry_ms });
                delay.delay_ms(retry_ms);
            }
        }
    }

    fn step_auth(&mut self, net: &mut impl Exchange, sink: &mut impl EventSink) -> Result<(), Error> {
        let req = AuthRequest {
            name: &self.identity.user,
            pass: &self.identity.password,
            device: &self.identity.device,
            meta: self.identity.meta.as_deref().filter(|m| !m.is_empty()),
        };
        let body = encode(&req)?;
        let reply = self.request(net, wire::PATH_AUTHORIZE, &body)?;
        let id = reply.session_id()?;

        self.session.authorize(id);
        self.handle.set_authorized(true);
        self.handle.clear_intent(Intent::Auth);
        self.handle.set_intent(Intent::GetMessages);
        info!("Sync: authorized as '{}'", self.identity.user);
        sink.emit(&AppEvent::Authorized);
        Ok(())
    }

    fn step_get_messages(
        &mut self,
        net: &mut impl Exchange,
        sink: &mut impl EventSink,
    ) -> Result<(), Error> {
        self.handle.clear_intent(Intent::GetMessages);
        let Some(shash) = self.session.id().map(str::to_owned) else {
            return Ok(());
        };

        let body = encode(&GetMsgsRequest {
            shash: &shash,
            stamp: self.session.last_stamp(),
        })?;
        let mut reply = self.request(net, wire::PATH_GET_MSGS, &body)?;
        let msgs = reply.take_messages();

        for stamp in msgs.iter().filter_map(|m| m.stamp.as_deref()) {
            self.session.advance_stamp(stamp);
        }
        let count = msgs.len();
        self.handle.incoming().replace(msgs);
        if count > 0 {
            sink.emit(&AppEvent::MessagesFetched { count });
        }
        Ok(())
    }

    fn deliver_incoming(&mut self, board: &mut impl BoardPort) {
        let batch = self.handle.incoming().take_front(usize::from(self.config.incoming_batch));
        for (i, msg) in batch.iter().enumerate() {
            if i > 0 {
                std::thread::yield_now();
            }
            if let Err(e) = handlers::dispatch(msg, &self.identity.device, &self.handle, board) {
                warn!("Sync: incoming message skipped: {}", e);
            }
        }
    }

    fn step_send_messages(
        &mut self,
        net: &mut impl Exchange,
        sink: &mut impl EventSink,
    ) -> Result<(), Error> {
        let Some(shash) = self.session.id().map(str::to_owned) else {
            return Ok(());
        };
        let batch = self.handle.outgoing().drain();
        if batch.is_empty() {
            self.handle.clear_intent(Intent::SendMessages);
            return Ok(());
        }

        let sent = encode(&AddMsgsRequest {
            shash: &shash,
            msgs: &batch,
        })
        .and_then(|body| self.request(net, wire::PATH_ADD_MSGS, &body));

        match sent {
            Ok(_) => {
                self.handle.clear_intent(Intent::SendMessages);
                sink.emit(&AppEvent::MessagesSent { count: batch.len() });
                Ok(())
            }
            Err(e) => {
                self.handle.outgoing().restore(batch);
                Err(e)
            }
        }
    }

    fn step_snapshot(
        &mut self,
        net: &mut impl Exchange,
        camera: &mut impl CameraPort,
        sink: &mut impl EventSink,
    ) -> Result<(), Error> {
        let Some(path) = self.session.id().map(wire::record_path) else {
            return Ok(());
        };
        let frame = match camera.capture(CaptureMode::Snapshot) {
            Ok(f) => f,
            Err(e) => {
                warn!("Sync: snapshot capture failed: {}", e);
                return Ok(());
            }
        };

        self.request(net, &path, &frame)?;
        self.handle.clear_intent(Intent::SendSnapshot);
        sink.emit(&AppEvent::SnapshotUploaded { bytes: frame.len() });
        Ok(())
    }

    fn step_stream(
        &mut self,
        net: &mut impl StreamTransport,
        camera: &mut impl CameraPort,
        sink: &mut impl EventSink,
    ) -> Result<(), Error> {
        let Some(path) = self
            .session
            .id()
            .map(|id| wire::stream_path(id, self.config.stream_period_ms))
        else {
            return Ok(());
        };
        let frame = match camera.capture(CaptureMode::Stream) {
            Ok(f) => f,
            Err(e) => {
                warn!("Sync: stream capture failed: {}", e);
                self.handle.clear_intent(Intent::StreamFrame);
                return Ok(());
            }
        };

        let bytes = self.streamer.push(net, &path, frame)?;
        self.handle.clear_intent(Intent::StreamFrame);
        sink.emit(&AppEvent::FrameStreamed { bytes });
        Ok(())
    }

    // ── Requests ──────────────────────────────────────────────

    /// POST `body` and classify the reply.
    fn request(
        &mut self,
        net: &mut impl Exchange,
        path: &str,
        body: &[u8],
    ) -> Result<ServerReply, Error> {
        let mut out = OutboundBody::new(body);
        let mut response = ResponseBuffer::new(
            self.config.response_initial_bytes as usize,
            self.config.response_max_bytes as usize,
        );
        net.post(path, &mut out, &mut response)?;
        if response.overflowed() {
            return Err(ProtocolError::ResponseOverflow.into());
        }
        let reply = ServerReply::parse(response.as_slice())?;
        reply.check()?;
        Ok(reply)
    }

    // ── Failure policy ────────────────────────────────────────

    /// Apply the failure policy.  Returns whether the tick may go on.
    fn settle(
        &mut self,
        result: Result<(), Error>,
        net: &mut (impl Exchange + StreamTransport),
        sink: &mut impl EventSink,
    ) -> bool {
        let Err(e) = result else {
            return true;
        };
        match e {
            Error::SessionInvalid => {
                warn!("Sync: session rejected, re-authenticating");
                self.session.invalidate();
                self.handle.set_authorized(false);
                self.handle.replace_intents(IntentSet::only(Intent::Auth));
                sink.emit(&AppEvent::SessionLost);
                false
            }
            Error::Transport(t) => {
                warn!("Sync: transport error: {}", t);
                self.disconnect(net);
                sink.emit(&AppEvent::Disconnected);
                false
            }
            Error::Protocol(p) => {
                self.session.consecutive_protocol_errors += 1;
                let count = self.session.consecutive_protocol_errors;
                warn!("Sync: protocol error {} ({} so far)", p, count);
                if count > self.config.max_protocol_errors {
                    self.force_disconnect(net);
                    sink.emit(&AppEvent::ForcedDisconnect);
                    return false;
                }
                true
            }
            other => {
                error!("Sync: {}", other);
                true
            }
        }
    }

    /// Drop the connection and the session; pending work survives.
    fn disconnect(&mut self, net: &mut (impl Exchange + StreamTransport)) {
        self.streamer.teardown(net);
        net.disconnect();
        self.connected = false;
        self.session.invalidate();
        self.handle.set_authorized(false);
    }

    /// Drop everything and start over.
    fn force_disconnect(&mut self, net: &mut (impl Exchange + StreamTransport)) {
        warn!("Sync: too many protocol errors, resetting");
        self.disconnect(net);
        self.handle.replace_intents(IntentSet::EMPTY);
        self.handle.incoming().clear();
        self.handle.outgoing().clear();
        self.session.reset();
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(value).map_err(|_| Error::Malformed("request encoding"))
}
