//! Rate-limited viewport capture
//!
//! Wraps the external capture primitive with a bounded, linearly-growing
//! backoff against its per-second quota. The quota is a hard external
//! constraint shared by the whole process; the backoff grows per attempt but
//! is capped so one stuck tile cannot stall a run indefinitely.

use crate::{CaptureError, CaptureMetrics, RasterFormat, Severity, StatusSink};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

/// Failure modes of the external capture primitive.
///
/// `RateLimited` is the only retryable condition; everything else is opaque
/// to the core and propagates immediately.
#[derive(Debug, Clone, Error)]
pub enum CaptureBackendError {
    #[error("capture quota exceeded")]
    RateLimited,
    #[error("{0}")]
    Other(String),
}

/// The external capture primitive: one visible-viewport image per call.
#[async_trait]
pub trait ViewportCapturer: Send + Sync {
    async fn capture_viewport(
        &self,
        format: RasterFormat,
        quality: f32,
    ) -> Result<Vec<u8>, CaptureBackendError>;
}

const BACKOFF_STEP_MS: u64 = 1000;
const BACKOFF_CAP_MS: u64 = 3000;

/// Captures one viewport image, retrying with capped linear backoff on
/// rate-limit errors.
pub struct RateLimitedCapturer {
    backend: Arc<dyn ViewportCapturer>,
    status: Arc<dyn StatusSink>,
    metrics: Arc<CaptureMetrics>,
    max_attempts: usize,
}

impl RateLimitedCapturer {
    pub fn new(
        backend: Arc<dyn ViewportCapturer>,
        status: Arc<dyn StatusSink>,
        metrics: Arc<CaptureMetrics>,
        max_attempts: usize,
    ) -> Self {
        Self {
            backend,
            status,
            metrics,
            max_attempts,
        }
    }

    /// Backoff before retry number `attempt` (1-based): `min(1000 * attempt, 3000)` ms.
    pub fn backoff_delay(attempt: usize) -> Duration {
        Duration::from_millis((BACKOFF_STEP_MS * attempt as u64).min(BACKOFF_CAP_MS))
    }

    /// Capture one viewport image.
    ///
    /// At most `max_attempts` tries. A `RateLimited` failure waits out the
    /// backoff and retries; any other failure propagates without retry.
    /// Exhausting all attempts fails with `CaptureExhausted`.
    pub async fn capture(
        &self,
        format: RasterFormat,
        quality: f32,
    ) -> Result<Vec<u8>, CaptureError> {
        for attempt in 1..=self.max_attempts {
            match self.backend.capture_viewport(format, quality).await {
                Ok(bytes) => return Ok(bytes),
                Err(CaptureBackendError::RateLimited) => {
                    if attempt == self.max_attempts {
                        break;
                    }
                    let delay = Self::backoff_delay(attempt);
                    debug!(
                        "capture rate limited (attempt {}/{}), backing off {:?}",
                        attempt, self.max_attempts, delay
                    );
                    self.status.message(
                        &format!(
                            "Capture rate limited, retrying in {}ms",
                            delay.as_millis()
                        ),
                        Severity::Warning,
                    );
                    self.metrics.record_retry();
                    sleep(delay).await;
                }
                Err(CaptureBackendError::Other(msg)) => {
                    return Err(CaptureError::CaptureFailed(msg));
                }
            }
        }

        Err(CaptureError::CaptureExhausted {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullStatusSink;
    use mockall::mock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    mock! {
        pub Backend {}

        #[async_trait]
        impl ViewportCapturer for Backend {
            async fn capture_viewport(
                &self,
                format: RasterFormat,
                quality: f32,
            ) -> Result<Vec<u8>, CaptureBackendError>;
        }
    }

    fn capturer(backend: MockBackend, max_attempts: usize) -> RateLimitedCapturer {
        RateLimitedCapturer::new(
            Arc::new(backend),
            Arc::new(NullStatusSink),
            Arc::new(CaptureMetrics::new()),
            max_attempts,
        )
    }

    #[test]
    fn test_backoff_delay_grows_then_caps() {
        assert_eq!(RateLimitedCapturer::backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(RateLimitedCapturer::backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(RateLimitedCapturer::backoff_delay(3), Duration::from_millis(3000));
        assert_eq!(RateLimitedCapturer::backoff_delay(7), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_through_rate_limit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_mock = calls.clone();

        let mut backend = MockBackend::new();
        backend
            .expect_capture_viewport()
            .times(3)
            .returning(move |_, _| {
                if calls_in_mock.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CaptureBackendError::RateLimited)
                } else {
                    Ok(vec![1, 2, 3])
                }
            });

        let started = tokio::time::Instant::now();
        let result = capturer(backend, 3).capture(RasterFormat::Png, 0.9).await;

        assert_eq!(result.unwrap(), vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two backoff waits: 1000ms then 2000ms.
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_max_attempts() {
        let mut backend = MockBackend::new();
        backend
            .expect_capture_viewport()
            .times(3)
            .returning(|_, _| Err(CaptureBackendError::RateLimited));

        let result = capturer(backend, 3).capture(RasterFormat::Png, 0.9).await;
        assert!(matches!(
            result,
            Err(CaptureError::CaptureExhausted { attempts: 3 })
        ));
    }

    #[tokio::test]
    async fn test_non_rate_limit_failure_does_not_retry() {
        let mut backend = MockBackend::new();
        backend
            .expect_capture_viewport()
            .times(1)
            .returning(|_, _| Err(CaptureBackendError::Other("page closed".to_string())));

        let result = capturer(backend, 3).capture(RasterFormat::Jpeg, 0.5).await;
        assert!(matches!(result, Err(CaptureError::CaptureFailed(msg)) if msg == "page closed"));
    }
}
