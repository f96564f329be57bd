//! Peripheral initialisation, interrupt-side drivers and task spawning.

pub mod button;
pub mod hw_init;
pub mod task_pin;
