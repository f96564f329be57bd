//! Application core: domain events, port traits and the device service.
//!
//! All interaction with hardware and the network happens through **port
//! traits** defined in [`ports`], keeping the sync engine and the
//! configuration exchange testable without real peripherals.

pub mod events;
pub mod ports;
pub mod service;
