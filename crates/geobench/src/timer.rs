//! Wall-clock timing on the monotonic clock.

use std::time::{Duration, Instant};

/// Running stopwatch.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Run `operation` once and return how long it took alongside its output.
///
/// No retry and no timeout: a failing operation is timed and its error
/// returned like any other value.
pub fn measure<T>(operation: impl FnOnce() -> T) -> (Duration, T) {
    let timer = Timer::start();
    let output = operation();
    (timer.elapsed(), output)
}

/// Render a duration with a unit suited to its magnitude.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos < 1_000 {
        format!("{nanos} ns")
    } else if nanos < 1_000_000 {
        format!("{:.2} µs", nanos as f64 / 1_000.0)
    } else if nanos < 1_000_000_000 {
        format!("{:.2} ms", nanos as f64 / 1_000_000.0)
    } else {
        format!("{:.2} s", nanos as f64 / 1_000_000_000.0)
    }
}
