//! Periodic trigger engine.
//!
//! The scheduler notifies a [`SchedulerDelegate`] when a task's period
//! elapses; the sync handle implements the delegate by setting the task's
//! intent bit for the worker.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Periodic tasks                           │
//! │                                                              │
//! │  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌──────────┐   │
//! │  │ get msgs  │  │ send msgs │  │ stream    │  │ probe    │   │
//! │  │ (session) │  │ (session) │  │ (session) │  │          │   │
//! │  └─────┬─────┘  └─────┬─────┘  └─────┬─────┘  └─────┬────┘   │
//! │        ▼              ▼              ▼              ▼        │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │              SchedulerDelegate                         │  │
//! │  │            (SyncHandle sets intent bit)                │  │
//! │  └───────────────────────┬────────────────────────────────┘  │
//! │                          ▼                                   │
//! │                    SyncEngine.tick()                         │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use crate::app::ports::SchedulerDelegate;
use crate::config::SystemConfig;
use crate::sync::Intent;
use log::info;

// ═══════════════════════════════════════════════════════════════
//  Schedule types
// ═══════════════════════════════════════════════════════════════

/// A single periodic task.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// Human-readable label (e.g., "get-msgs").
    pub label: &'static str,
    pub period_ms: u32,
    /// Bit set on every fire.
    pub intent: Intent,
    /// Skip fires while no session is established.
    pub requires_session: bool,
    pub enabled: bool,
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

/// Maximum number of concurrent schedules (stack-allocated).
const MAX_SCHEDULES: usize = 4;

pub struct Scheduler {
    schedules: [Option<ScheduleEntry>; MAX_SCHEDULES],
    /// Global enable flag.
    enabled: bool,
}

/// Internal bookkeeping for a live schedule.
#[derive(Debug, Clone)]
struct ScheduleEntry {
    schedule: Schedule,
    elapsed_ms: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            schedules: [None, None, None, None],
            enabled: true,
        }
    }

    /// The four sync triggers with periods from `config`.
    pub fn for_sync(config: &SystemConfig) -> Self {
        let mut s = Self::new();
        let tasks = [
            ("get-msgs", config.get_msgs_period_ms, Intent::GetMessages, true),
            ("send-msgs", config.send_msgs_period_ms, Intent::SendMessages, true),
            ("stream", config.stream_period_ms, Intent::StreamFrame, true),
            ("probe", config.probe_period_ms, Intent::Probe, false),
        ];
        for (label, period_ms, intent, requires_session) in tasks {
            s.add(Schedule {
                label,
                period_ms,
                intent,
                requires_session,
                enabled: true,
            });
        }
        s
    }

    /// Add a schedule.  Returns the slot index, or `None` if full.
    pub fn add(&mut self, schedule: Schedule) -> Option<usize> {
        for (i, slot) in self.schedules.iter_mut().enumerate() {
            if slot.is_none() {
                info!(
                    "Scheduler: added '{}' every {} ms at slot {}",
                    schedule.label, schedule.period_ms, i
                );
                *slot = Some(ScheduleEntry {
                    schedule,
                    elapsed_ms: 0,
                });
                return Some(i);
            }
        }
        None // All slots full.
    }

    /// Remove a schedule by slot index.
    pub fn remove(&mut self, slot: usize) {
        if slot < MAX_SCHEDULES {
            if let Some(entry) = &self.schedules[slot] {
                info!("Scheduler: removed '{}' from slot {}", entry.schedule.label, slot);
            }
            self.schedules[slot] = None;
        }
    }

    /// Enable or disable the entire scheduler.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Advance every task by `tick_ms` and fire the ones whose period elapsed.
    ///
    /// A session-bound task that comes due without a session restarts its
    /// period silently.
    pub fn tick(&mut self, tick_ms: u32, delegate: &mut dyn SchedulerDelegate) {
        if !self.enabled {
            return;
        }
        let session_ready = delegate.session_ready();

        for slot in self.schedules.iter_mut() {
            let entry = match slot {
                Some(e) if e.schedule.enabled => e,
                _ => continue,
            };

            entry.elapsed_ms += u64::from(tick_ms);
            if entry.elapsed_ms < u64::from(entry.schedule.period_ms) {
                continue;
            }
            entry.elapsed_ms = 0;

            if entry.schedule.requires_session && !session_ready {
                continue;
            }
            delegate.on_schedule_fired(entry.schedule.label, entry.schedule.intent);
        }
    }

    /// Number of active (enabled) schedules.
    pub fn active_count(&self) -> usize {
        self.schedules
            .iter()
            .filter(|s| s.as_ref().is_some_and(|e| e.schedule.enabled))
            .count()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    /// Test delegate that records fires.
    struct RecordingDelegate {
        ready: bool,
        fires: Vec<(String, Intent)>,
    }

    impl RecordingDelegate {
        fn new(ready: bool) -> Self {
            Self {
                ready,
                fires: Vec::new(),
            }
        }
    }

    impl SchedulerDelegate for RecordingDelegate {
        fn session_ready(&self) -> bool {
            self.ready
        }

        fn on_schedule_fired(&mut self, label: &str, intent: Intent) {
            self.fires.push((label.to_string(), intent));
        }
    }

    fn probe_every(ms: u32) -> Schedule {
        Schedule {
            label: "probe",
            period_ms: ms,
            intent: Intent::Probe,
            requires_session: false,
            enabled: true,
        }
    }

    #[test]
    fn periodic_fires_at_interval() {
        let mut sched = Scheduler::new();
        let mut delegate = RecordingDelegate::new(false);
        sched.add(probe_every(1000));

        for _ in 0..9 {
            sched.tick(100, &mut delegate);
        }
        assert!(delegate.fires.is_empty());

        sched.tick(100, &mut delegate);
        assert_eq!(delegate.fires, [("probe".to_string(), Intent::Probe)]);
    }

    #[test]
    fn session_bound_tasks_wait_for_session() {
        let mut sched = Scheduler::for_sync(&SystemConfig::default());
        assert_eq!(sched.active_count(), 4);

        let mut delegate = RecordingDelegate::new(false);
        for _ in 0..50 {
            sched.tick(100, &mut delegate);
        }
        assert!(delegate.fires.iter().all(|(_, i)| *i == Intent::Probe));
        assert_eq!(delegate.fires.len(), 2);

        delegate.ready = true;
        for _ in 0..10 {
            sched.tick(100, &mut delegate);
        }
        assert!(delegate.fires.iter().any(|(_, i)| *i == Intent::StreamFrame));
    }

    #[test]
    fn full_table_rejects_more() {
        let mut sched = Scheduler::for_sync(&SystemConfig::default());
        assert!(sched.add(probe_every(10)).is_none());
        sched.remove(3);
        assert_eq!(sched.add(probe_every(10)), Some(3));
    }

    #[test]
    fn disabled_scheduler_does_nothing() {
        let mut sched = Scheduler::new();
        let mut delegate = RecordingDelegate::new(true);
        sched.add(probe_every(100));
        sched.set_enabled(false);

        for _ in 0..10 {
            sched.tick(100, &mut delegate);
        }
        assert!(delegate.fires.is_empty());
    }
}
