//! Lightweight timing utilities.
//!
//! Timers report through `tracing` at debug level so planning and
//! compilation cost shows up next to the rest of the pipeline logs.

use std::time::Instant;

/// A simple timer that measures elapsed time.
pub struct Timer {
    label: &'static str,
    start: Instant,
}

impl Timer {
    /// Create and start a new timer with the given label.
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }

    /// Elapsed seconds so far.
    pub fn elapsed_s(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Stop the timer, log the result and return elapsed seconds.
    pub fn stop_and_log(self) -> f64 {
        let elapsed = self.elapsed_s();
        tracing::debug!(label = self.label, elapsed_ms = elapsed * 1e3, "timing");
        elapsed
    }
}
