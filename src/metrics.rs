use metrics::{Counter, Gauge, Histogram};
use std::time::Duration;

/// Performance counters for the capture pipeline.
///
/// Handles are no-ops unless a recorder is installed by the embedding
/// application; the core records unconditionally.
pub struct CaptureMetrics {
    pub tiles_captured: Counter,
    pub tile_retries: Counter,
    pub runs_completed: Counter,
    pub runs_failed: Counter,
    pub run_duration: Histogram,
    pub composite_scale: Gauge,
    pub composite_bytes: Gauge,
}

impl CaptureMetrics {
    pub fn new() -> Self {
        Self {
            tiles_captured: Counter::noop(),
            tile_retries: Counter::noop(),
            runs_completed: Counter::noop(),
            runs_failed: Counter::noop(),
            run_duration: Histogram::noop(),
            composite_scale: Gauge::noop(),
            composite_bytes: Gauge::noop(),
        }
    }

    pub fn record_tile(&self) {
        self.tiles_captured.increment(1);
    }

    pub fn record_retry(&self) {
        self.tile_retries.increment(1);
    }

    pub fn record_run(&self, duration: Duration, success: bool) {
        if success {
            self.runs_completed.increment(1);
        } else {
            self.runs_failed.increment(1);
        }
        self.run_duration.record(duration.as_secs_f64());
    }

    pub fn record_composite(&self, scale: f64, encoded_bytes: usize) {
        self.composite_scale.set(scale);
        self.composite_bytes.set(encoded_bytes as f64);
    }
}

impl Default for CaptureMetrics {
    fn default() -> Self {
        Self::new()
    }
}
