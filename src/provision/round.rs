//! Short-range configuration window.
//!
//! ```text
//!   start ──30 s──▶ expired
//!     │ peer connects: no deadline
//!     │ peer leaves:   10 s from now
//!     └ "*cmd*exit":   ended at once
//! ```

use log::{debug, info};

use crate::events::Event;

pub const ROUND_WINDOW_MS: u64 = 30_000;
pub const ROUND_RECONNECT_WINDOW_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Waiting { deadline_ms: u64 },
    PeerConnected,
    Ended,
}

#[derive(Debug, Clone, Copy)]
pub struct ConfigRound {
    phase: Phase,
}

impl Default for ConfigRound {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigRound {
    pub const fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    pub fn start(&mut self, now_ms: u64) {
        self.phase = Phase::Waiting {
            deadline_ms: now_ms + ROUND_WINDOW_MS,
        };
        info!("CfgRound: window open for {} ms", ROUND_WINDOW_MS);
    }

    pub fn on_peer_connected(&mut self) {
        if self.is_open() {
            self.phase = Phase::PeerConnected;
        }
    }

    pub fn on_peer_disconnected(&mut self, now_ms: u64) {
        if self.phase == Phase::PeerConnected {
            self.phase = Phase::Waiting {
                deadline_ms: now_ms + ROUND_RECONNECT_WINDOW_MS,
            };
            info!("CfgRound: peer gone, {} ms to reconnect", ROUND_RECONNECT_WINDOW_MS);
        }
    }

    pub fn on_exit(&mut self) {
        if self.is_open() {
            info!("CfgRound: ended by peer");
        }
        self.phase = Phase::Ended;
    }

    /// Whether the window is still open at `now_ms`.
    pub fn is_active(&self, now_ms: u64) -> bool {
        match self.phase {
            Phase::Waiting { deadline_ms } => now_ms < deadline_ms,
            Phase::PeerConnected => true,
            Phase::Idle | Phase::Ended => false,
        }
    }

    /// Apply a device event at `now_ms`.  Returns `false` for events the
    /// round does not handle.
    pub fn on_event(&mut self, event: Event, now_ms: u64) -> bool {
        match event {
            Event::ConfigPeerConnected => self.on_peer_connected(),
            Event::ConfigPeerDisconnected => self.on_peer_disconnected(now_ms),
            Event::ConfigExitRequested => self.on_exit(),
            Event::ButtonPressed(n) => {
                debug!("CfgRound: button {} ignored during round", n);
                return false;
            }
        }
        true
    }

    fn is_open(&self) -> bool {
        matches!(self.phase, Phase::Waiting { .. } | Phase::PeerConnected)
    }
}
