//! Periodic trigger task: reactor-driven scheduler ticks.
//!
//! Runs in a dedicated thread using `edge-executor` with an
//! `async-io-mini` timer (no busy-spinning).  Every tick advances the
//! [`Scheduler`]; fired tasks set intent bits through the [`SyncHandle`],
//! which the worker picks up on its next pass.
//!
//! ```text
//!  ┌───────────────────────────────────────────────┐
//!  │  Timer thread                                 │
//!  │  ┌─────────────────────────────────────────┐  │
//!  │  │ edge_executor::LocalExecutor            │  │
//!  │  │   tick loop: Timer::after(tick) ⏱       │  │
//!  │  │     └─▶ Scheduler::tick ──▶ SyncHandle  │  │
//!  │  └─────────────────────────────────────────┘  │
//!  └───────────────────────────────────────────────┘
//! ```

use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use log::info;

use super::engine::SyncHandle;
use crate::drivers::task_pin::{Core, spawn_on_core};
use crate::scheduler::Scheduler;

/// Handle to the running timer thread.
pub struct TimerTask {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl TimerTask {
    /// Ask the loop to finish after its current tick and wait for it.
    pub fn stop(self) {
        self.stop.store(true, Ordering::Release);
        if self.thread.join().is_err() {
            log::error!("Timer: thread panicked");
        }
    }
}

async fn tick_loop(mut scheduler: Scheduler, mut handle: SyncHandle, tick_ms: u32, stop: Arc<AtomicBool>) {
    let period = Duration::from_millis(u64::from(tick_ms));
    while !stop.load(Ordering::Acquire) {
        async_io_mini::Timer::after(period).await;
        scheduler.tick(tick_ms, &mut handle);
    }
}

fn run_timer_loop(scheduler: Scheduler, handle: SyncHandle, tick_ms: u32, stop: Arc<AtomicBool>) {
    let executor: edge_executor::LocalExecutor<'_, 2> = edge_executor::LocalExecutor::new();
    let active = scheduler.active_count();
    let task = executor.spawn(tick_loop(scheduler, handle, tick_ms, stop));

    info!("Timer task started ({} schedules, {} ms tick)", active, tick_ms);
    futures_lite::future::block_on(executor.run(task));
    info!("Timer task stopped");
}

/// Spawn the timer thread on the application core.
pub fn spawn(scheduler: Scheduler, handle: SyncHandle, tick_ms: u32) -> std::io::Result<TimerTask> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    let tick_ms = tick_ms.max(1);
    let thread = spawn_on_core(Core::App, 5, 4, "sync-timer\0", move || {
        run_timer_loop(scheduler, handle, tick_ms, flag);
    })?;
    Ok(TimerTask { stop, thread })
}
