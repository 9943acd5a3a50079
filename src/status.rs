//! Status channel for progress and user-facing notifications
//!
//! One-way, fire-and-forget: the core reports, a UI it does not own
//! consumes. Implementations must never fail the run; a sink that cannot
//! deliver should log and drop the notification.

use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Consumer of run progress and status messages.
pub trait StatusSink: Send + Sync {
    /// Overall run progress, 0-100.
    fn progress(&self, percent: u8);

    /// Human-readable status message.
    fn message(&self, text: &str, severity: Severity);
}

/// Routes status traffic to the tracing subscriber.
#[derive(Debug, Default)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn progress(&self, percent: u8) {
        info!("capture progress: {}%", percent);
    }

    fn message(&self, text: &str, severity: Severity) {
        match severity {
            Severity::Info => info!("{}", text),
            Severity::Warning => warn!("{}", text),
            Severity::Error => error!("{}", text),
        }
    }
}

/// Discards everything. Used by tests that don't assert on status traffic.
#[derive(Debug, Default)]
pub struct NullStatusSink;

impl StatusSink for NullStatusSink {
    fn progress(&self, _percent: u8) {}

    fn message(&self, _text: &str, _severity: Severity) {}
}
