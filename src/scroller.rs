//! Page scrolling with settle confirmation
//!
//! Moves the target page's scroll position and waits for the move to
//! visibly take effect before capture. Some pages clamp or animate scroll,
//! so settle confirmation is advisory: the scroller polls up to a timeout
//! and then returns regardless, and the orchestrator's fixed post-scroll
//! delay covers the unconfirmed cases.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::CaptureError;

/// Script execution failed in the target page (navigated away, permission
/// denied, evaluation threw).
#[derive(Debug, Clone, Error)]
#[error("page script failed: {0}")]
pub struct ScriptError(pub String);

/// The external page-scripting primitive.
///
/// One typed request/response per operation: the expression goes in, either
/// a JSON value or a structured error comes back. Never a silent null.
#[async_trait]
pub trait PageScripting: Send + Sync {
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value, ScriptError>;
}

/// Position tolerance under which a scroll counts as settled.
const SETTLE_TOLERANCE_PX: u32 = 5;

pub struct PageScroller {
    page: Arc<dyn PageScripting>,
    settle_timeout: Duration,
    poll_interval: Duration,
}

impl PageScroller {
    pub fn new(page: Arc<dyn PageScripting>, settle_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            page,
            settle_timeout,
            poll_interval,
        }
    }

    /// Scroll the page to `(x, y)` and wait for arrival.
    ///
    /// Fails only if the scroll command itself cannot be issued; an
    /// unconfirmed settle (clamped target, animated scroll) is logged and
    /// treated as done.
    pub async fn scroll_to(&self, x: u32, y: u32) -> Result<(), CaptureError> {
        self.page
            .evaluate(&format!("window.scrollTo({x}, {y})"))
            .await
            .map_err(|e| CaptureError::CaptureFailed(format!("scroll command failed: {e}")))?;

        let deadline = Instant::now() + self.settle_timeout;
        loop {
            if let Ok((cur_x, cur_y)) = self.current_position().await {
                if cur_x.abs_diff(x) <= SETTLE_TOLERANCE_PX
                    && cur_y.abs_diff(y) <= SETTLE_TOLERANCE_PX
                {
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                debug!("scroll to ({}, {}) did not settle within {:?}", x, y, self.settle_timeout);
                return Ok(());
            }

            sleep(self.poll_interval).await;
        }
    }

    /// Current page scroll position, rounded to whole pixels.
    pub async fn current_position(&self) -> Result<(u32, u32), CaptureError> {
        let value = self
            .page
            .evaluate("[window.scrollX, window.scrollY]")
            .await
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

        let coords = value.as_array().ok_or_else(|| {
            CaptureError::CaptureFailed("scroll position query returned a non-array".to_string())
        })?;
        let read = |i: usize| -> Option<u32> {
            coords.get(i)?.as_f64().map(|v| v.round().max(0.0) as u32)
        };

        match (read(0), read(1)) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => Err(CaptureError::CaptureFailed(
                "scroll position query returned non-numeric coordinates".to_string(),
            )),
        }
    }
}
