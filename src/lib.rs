//! camsync firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod pool;
pub mod provision;
pub mod scheduler;
pub mod sync;
pub mod wire;

// Platform modules; the real implementations are guarded by cfg
// attributes inside, host builds get simulation stubs.
pub mod adapters;
pub mod drivers;
pub mod pins;
