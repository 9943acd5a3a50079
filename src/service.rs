//! Capture run lifecycle
//!
//! `CaptureService` owns one capture run at a time: it snapshots page
//! metrics, prepares the page, drives the tile orchestrator, composites,
//! and exports. The capture backend is a strictly serialized, rate-limited
//! resource shared by the whole process, so a second concurrent run is
//! rejected fast with `CaptureInProgress` rather than queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    CaptureError, CaptureMetrics, CaptureOptions, CaptureOrchestrator, Composite, Compositor,
    Config, DownloadSink, ExportAdapter, PageMetrics, PageScripting, PageScroller,
    RateLimitedCapturer, Severity, StatusSink, ViewportCapturer,
};

/// Lifecycle of a capture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Preparing,
    Capturing,
    Compositing,
    Exporting,
    Done,
    Failed,
}

/// Result of a completed run, delivered to the caller.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub run_id: Uuid,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub scale: f64,
    pub tile_count: usize,
    pub duration: Duration,
}

/// Releases the single-flight guard on every exit path, including early
/// returns and panics during the run.
struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct CaptureService {
    backend: Arc<dyn ViewportCapturer>,
    page: Arc<dyn PageScripting>,
    sink: Arc<dyn DownloadSink>,
    status: Arc<dyn StatusSink>,
    metrics: Arc<CaptureMetrics>,
    config: Config,
    in_flight: Arc<AtomicBool>,
    state: Arc<Mutex<RunState>>,
}

impl CaptureService {
    pub fn new(
        backend: Arc<dyn ViewportCapturer>,
        page: Arc<dyn PageScripting>,
        sink: Arc<dyn DownloadSink>,
        status: Arc<dyn StatusSink>,
        metrics: Arc<CaptureMetrics>,
        config: Config,
    ) -> Self {
        Self {
            backend,
            page,
            sink,
            status,
            metrics,
            config,
            in_flight: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(RunState::Idle)),
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap()
    }

    /// Execute one capture run end to end.
    ///
    /// At most one run is active per service; a concurrent call fails fast
    /// with `CaptureInProgress`. Every exit path releases the guard, and no
    /// partial artifact is ever delivered.
    pub async fn run(&self, options: CaptureOptions) -> Result<CaptureOutcome, CaptureError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaptureError::CaptureInProgress);
        }
        let _guard = RunGuard {
            flag: self.in_flight.clone(),
        };

        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!("capture run {} started", run_id);

        let result = self.run_inner(run_id, &options).await;
        let duration = started.elapsed();
        self.metrics.record_run(duration, result.is_ok());
        let result = result.map(|mut outcome| {
            outcome.duration = duration;
            outcome
        });

        match &result {
            Ok(outcome) => {
                self.set_state(RunState::Done);
                info!(
                    "capture run {} done in {:?}: {} ({}x{}, {} tiles)",
                    run_id,
                    duration,
                    outcome.filename,
                    outcome.width,
                    outcome.height,
                    outcome.tile_count
                );
            }
            Err(e) => {
                self.set_state(RunState::Failed);
                self.status.message(&e.to_string(), Severity::Error);
                warn!("capture run {} failed: {}", run_id, e);
            }
        }

        result
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        options: &CaptureOptions,
    ) -> Result<CaptureOutcome, CaptureError> {
        self.set_state(RunState::Preparing);
        self.status.progress(0);

        let page_metrics = self.measure_page().await?;
        debug!(
            "page is {}x{}, viewport {}x{}",
            page_metrics.scroll_width,
            page_metrics.scroll_height,
            page_metrics.viewport_width,
            page_metrics.viewport_height
        );
        self.status.progress(10);

        let initial_scroll = self.prepare_page(options).await;
        self.status.progress(20);

        self.set_state(RunState::Capturing);
        let capturer = RateLimitedCapturer::new(
            self.backend.clone(),
            self.status.clone(),
            self.metrics.clone(),
            self.config.capture_max_attempts,
        );

        let (composite, tile_count) = if options.full_page {
            let scroller = PageScroller::new(
                self.page.clone(),
                self.config.scroll_settle_timeout,
                self.config.scroll_poll_interval,
            );
            let orchestrator = CaptureOrchestrator::new(
                capturer,
                scroller,
                self.status.clone(),
                self.metrics.clone(),
                self.config.settle_delay,
            );
            let tiles = orchestrator.capture_tiles(&page_metrics, options).await?;
            let tile_count = tiles.len();

            self.set_state(RunState::Compositing);
            let composite =
                Compositor::assemble(&tiles, options.format.raster(), options.quality).await?;
            (composite, tile_count)
        } else {
            // Single-tile capture: no grid, no compositor.
            let composite = self.capture_single(&capturer, options).await?;
            (composite, 1)
        };
        self.metrics
            .record_composite(composite.scale, composite.encoded.len());

        self.set_state(RunState::Exporting);
        let exporter = ExportAdapter::new(self.sink.clone(), self.status.clone());
        let filename = exporter.export(&composite, options).await?;

        self.restore_page(options, initial_scroll).await;
        self.status.progress(100);

        Ok(CaptureOutcome {
            run_id,
            filename,
            width: composite.width,
            height: composite.height,
            scale: composite.scale,
            tile_count,
            duration: Duration::default(),
        })
    }

    /// Snapshot page and viewport dimensions. Failure here is fatal: the
    /// capture plan cannot be computed without trustworthy metrics.
    async fn measure_page(&self) -> Result<PageMetrics, CaptureError> {
        let value = self
            .page
            .evaluate(
                "({\
                 scroll_width: document.documentElement.scrollWidth,\
                 scroll_height: document.documentElement.scrollHeight,\
                 viewport_width: window.innerWidth,\
                 viewport_height: window.innerHeight,\
                 device_pixel_ratio: window.devicePixelRatio})",
            )
            .await
            .map_err(|e| {
                CaptureError::InvalidGeometry(format!("page metrics query failed: {e}"))
            })?;

        serde_json::from_value(value)
            .map_err(|e| CaptureError::InvalidGeometry(format!("malformed page metrics: {e}")))
    }

    /// Cosmetic page preparation. Failures only affect visual quality, not
    /// correctness, so each step is logged and skipped on error.
    async fn prepare_page(&self, options: &CaptureOptions) -> Option<(u32, u32)> {
        let initial_scroll = match self
            .page
            .evaluate("[window.scrollX, window.scrollY]")
            .await
            .ok()
            .and_then(|v| {
                let arr = v.as_array()?.clone();
                Some((
                    arr.first()?.as_f64()?.round() as u32,
                    arr.get(1)?.as_f64()?.round() as u32,
                ))
            }) {
            Some(pos) => Some(pos),
            None => {
                debug!("could not read initial scroll position");
                None
            }
        };

        if options.hide_scrollbar {
            if let Err(e) = self
                .page
                .evaluate("document.documentElement.style.overflow = 'hidden'")
                .await
            {
                self.status.message(
                    &format!("Could not hide scrollbar, continuing: {e}"),
                    Severity::Warning,
                );
            }
        }

        // Frozen animations keep tile seams consistent between captures.
        if let Err(e) = self
            .page
            .evaluate("document.getAnimations().forEach(a => a.pause())")
            .await
        {
            self.status.message(
                &format!("Could not pause animations, continuing: {e}"),
                Severity::Warning,
            );
        }

        if options.wait_for_images {
            let script = "Array.from(document.images)\
                          .filter(img => !img.complete)\
                          .length";
            // Poll until in-flight images finish or the wait times out.
            let deadline = Instant::now() + Duration::from_secs(5);
            loop {
                match self.page.evaluate(script).await {
                    Ok(v) if v.as_u64() == Some(0) => break,
                    Ok(_) if Instant::now() < deadline => {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                    Ok(_) => {
                        self.status.message(
                            "Some images were still loading when capture started",
                            Severity::Warning,
                        );
                        break;
                    }
                    Err(e) => {
                        self.status.message(
                            &format!("Image readiness check failed, continuing: {e}"),
                            Severity::Warning,
                        );
                        break;
                    }
                }
            }
        }

        initial_scroll
    }

    /// Best-effort restoration of scrollbar and scroll position.
    async fn restore_page(&self, options: &CaptureOptions, initial_scroll: Option<(u32, u32)>) {
        if options.hide_scrollbar {
            if let Err(e) = self
                .page
                .evaluate("document.documentElement.style.overflow = ''")
                .await
            {
                debug!("could not restore scrollbar: {}", e);
            }
        }

        if let Some((x, y)) = initial_scroll {
            if let Err(e) = self.page.evaluate(&format!("window.scrollTo({x}, {y})")).await {
                debug!("could not restore scroll position: {}", e);
            }
        }
    }

    async fn capture_single(
        &self,
        capturer: &RateLimitedCapturer,
        options: &CaptureOptions,
    ) -> Result<Composite, CaptureError> {
        let format = options.format.raster();
        let bytes = capturer.capture(format, options.quality).await?;

        let (width, height) = image::load_from_memory_with_format(&bytes, format.image_format())
            .map(|img| (img.width(), img.height()))
            .map_err(|e| CaptureError::InvalidTileData {
                x: 0,
                y: 0,
                reason: e.to_string(),
            })?;

        self.status.progress(80);
        Ok(Composite {
            encoded: bytes,
            width,
            height,
            scale: 1.0,
        })
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap() = state;
    }
}
