//! Chromium-backed capture and scripting primitives
//!
//! Concrete implementations of `ViewportCapturer` and `PageScripting` over
//! a headless Chromium session driven through the DevTools protocol.

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::{
    create_browser_config, CaptureBackendError, CaptureError, Config, PageScripting,
    RasterFormat, ScriptError, ViewportCapturer,
};

/// One live browser tab, usable as both capture and scripting primitive.
#[derive(Clone)]
pub struct CdpPage {
    page: Page,
}

#[async_trait]
impl ViewportCapturer for CdpPage {
    async fn capture_viewport(
        &self,
        format: RasterFormat,
        quality: f32,
    ) -> Result<Vec<u8>, CaptureBackendError> {
        let params = match format {
            RasterFormat::Png => ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .build(),
            RasterFormat::Jpeg => ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Jpeg)
                .quality((quality.clamp(0.0, 1.0) * 100.0) as i64)
                .build(),
        };

        self.page
            .screenshot(params)
            .await
            .map_err(|e| classify_capture_error(&e.to_string()))
    }
}

#[async_trait]
impl PageScripting for CdpPage {
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value, ScriptError> {
        self.page
            .evaluate(expression)
            .await
            .map_err(|e| ScriptError(e.to_string()))?
            .into_value::<serde_json::Value>()
            .map_err(|e| ScriptError(format!("script result not deserializable: {e}")))
    }
}

/// The backend signals quota exhaustion through the error message; anything
/// else is opaque.
fn classify_capture_error(message: &str) -> CaptureBackendError {
    let lowered = message.to_lowercase();
    if lowered.contains("quota") || lowered.contains("rate limit") {
        CaptureBackendError::RateLimited
    } else {
        CaptureBackendError::Other(message.to_string())
    }
}

/// A launched Chromium with one navigated page.
pub struct CdpSession {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
    page: Page,
}

impl CdpSession {
    /// Launch Chromium, open `url`, and wait for navigation to finish.
    pub async fn launch(config: &Config, url: &str) -> Result<Self, CaptureError> {
        let browser_config = create_browser_config(config);

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| CaptureError::CaptureFailed(format!("browser launch failed: {e}")))?;

        // The handler stream must be polled for the DevTools connection to
        // make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("devtools handler error: {}", e);
                    break;
                }
            }
            debug!("devtools handler stream ended");
        });

        let page = browser
            .new_page(url)
            .await
            .map_err(|e| CaptureError::CaptureFailed(format!("failed to open page: {e}")))?;

        timeout(config.navigation_timeout, page.wait_for_navigation())
            .await
            .map_err(|_| {
                CaptureError::CaptureFailed(format!(
                    "navigation timed out after {:?}",
                    config.navigation_timeout
                ))
            })?
            .map_err(|e| CaptureError::CaptureFailed(format!("navigation failed: {e}")))?;

        info!("page ready: {}", url);

        Ok(Self {
            browser,
            handler_task,
            page,
        })
    }

    /// The session's tab as a capture/scripting primitive.
    pub fn primitives(&self) -> Arc<CdpPage> {
        Arc::new(CdpPage {
            page: self.page.clone(),
        })
    }

    pub async fn shutdown(mut self) {
        let _ = self.page.close().await;
        if let Err(e) = self.browser.close().await {
            debug!("browser close failed: {}", e);
        }
        self.handler_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_errors_are_rate_limited() {
        assert!(matches!(
            classify_capture_error("MAX_WRITE_QUOTA exceeded"),
            CaptureBackendError::RateLimited
        ));
        assert!(matches!(
            classify_capture_error("screenshot rate limit hit"),
            CaptureBackendError::RateLimited
        ));
        assert!(matches!(
            classify_capture_error("target closed"),
            CaptureBackendError::Other(_)
        ));
    }
}
