//! Core-pinned thread spawning for the ESP32 dual-core.
//!
//! Wraps `esp_pthread_set_cfg()` so that `std::thread::spawn` creates a
//! FreeRTOS task pinned to a specific CPU core with explicit priority
//! and stack size.  On non-ESP targets, falls back to plain thread spawn.
//!
//! `esp_pthread_set_cfg()` applies to the *next* `pthread_create()` from
//! the calling thread, so the config→spawn pair must not be interleaved
//! with other thread creation on the same thread.

/// CPU core identifiers for the ESP32 Xtensa LX6 dual-core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU), protocol stacks (WiFi, BLE, lwIP).
    Pro = 0,
    /// Core 1 (APP_CPU), sync worker and timers.
    App = 1,
}

/// Spawn a thread pinned to `core` with explicit priority and stack.
///
/// `name` must be NUL-terminated (e.g. `"sync-timer\0"`).
#[cfg(target_os = "espidf")]
pub fn spawn_on_core<T: Send + 'static>(
    core: Core,
    priority: u8,
    stack_kb: usize,
    name: &'static str,
    f: impl FnOnce() -> T + Send + 'static,
) -> std::io::Result<std::thread::JoinHandle<T>> {
    // SAFETY: `cfg` is fully initialised by the IDF default and `name`
    // is a NUL-terminated static.
    let ret = unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = core as i32;
        cfg.prio = i32::from(priority);
        cfg.stack_size = (stack_kb * 1024) as i32;
        cfg.thread_name = name.as_ptr().cast();
        esp_idf_sys::esp_pthread_set_cfg(&cfg)
    };
    if ret != esp_idf_sys::ESP_OK {
        return Err(std::io::Error::other(format!("esp_pthread_set_cfg failed: {ret}")));
    }

    let display_name = name.trim_end_matches('\0');
    log::info!(
        "Spawning '{}' on {:?} (pri={}, stack={}KB)",
        display_name,
        core,
        priority,
        stack_kb
    );

    std::thread::Builder::new().name(display_name.into()).spawn(f)
}

/// Simulation fallback, ignores core affinity and priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_on_core<T: Send + 'static>(
    _core: Core,
    _priority: u8,
    stack_kb: usize,
    name: &'static str,
    f: impl FnOnce() -> T + Send + 'static,
) -> std::io::Result<std::thread::JoinHandle<T>> {
    let display_name = name.trim_end_matches('\0');
    log::info!(
        "Spawning '{}' (sim, no core pinning, stack={}KB)",
        display_name,
        stack_kb
    );

    std::thread::Builder::new()
        .name(display_name.into())
        .stack_size(stack_kb * 1024)
        .spawn(f)
}
