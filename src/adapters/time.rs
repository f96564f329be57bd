//! Monotonic clock.
//!
//! Drives the configuration round deadlines.
//!
//! - **`target_os = "espidf"`**: wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer (microsecond precision, monotonic).
//! - **`not(target_os = "espidf")`**: uses `std::time::Instant` for
//!   host-side testing and simulation.

pub struct Clock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Milliseconds since boot.
    #[cfg(target_os = "espidf")]
    pub fn uptime_ms(&self) -> u64 {
        // SAFETY: reads the RTC-backed high-resolution counter.
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    /// Milliseconds since this clock was created.
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_monotonic() {
        let clock = Clock::new();
        let a = clock.uptime_ms();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(clock.uptime_ms() >= a + 1);
    }
}
