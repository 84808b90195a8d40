use log::{log_enabled, trace, warn, Level};
use std::time::{Duration, Instant};

/// Traces the wall time of a simulation stage when trace logging is on.
pub struct ScopedTimer<'a> {
    stage: &'a str,
    start: Instant,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(stage: &'a str) -> Self {
        if log_enabled!(Level::Trace) {
            trace!("begin {stage}");
        }
        Self {
            stage,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        if log_enabled!(Level::Trace) {
            trace!("end {} ({} µs)", self.stage, self.start.elapsed().as_micros());
        }
    }
}

/// Warns when a tick took longer than its budget. Returns whether it did.
pub fn warn_if_tick_budget_exceeded(duration: Duration, budget_ms: f32) -> bool {
    let elapsed_ms = duration.as_secs_f32() * 1000.0;
    if elapsed_ms > budget_ms {
        warn!("physics tick over budget: {elapsed_ms:.2} ms > {budget_ms:.2} ms");
        return true;
    }
    false
}
