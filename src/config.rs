//! Configuration management with serde serialization/deserialization
//!
//! Provides the service-level `Config`, the per-run `CaptureOptions`, and the
//! Chrome launch helpers used by the CDP-backed session.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Service-level configuration for the capture pipeline.
///
/// Controls the browser viewport, capture timing, and Chrome launch settings.
/// Loadable from a JSON file and overridable from the CLI.
///
/// # Examples
///
/// ```rust
/// use pagestitch::Config;
///
/// let config = Config {
///     settle_delay: std::time::Duration::from_millis(500),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Browser viewport used for every tile capture
    pub viewport: Viewport,

    /// Fixed delay applied after each scroll, before capture (default: 350ms)
    ///
    /// Compensates for scroll commands whose settle confirmation timed out,
    /// and for paint work that finishes after the scroll position lands.
    pub settle_delay: Duration,

    /// How long to poll for a scroll command to visibly take effect
    /// (default: 2s). Elapsing is advisory only and never fails a run.
    pub scroll_settle_timeout: Duration,

    /// Poll interval while waiting for a scroll to settle (default: 50ms)
    pub scroll_poll_interval: Duration,

    /// Maximum capture attempts per tile under rate limiting (default: 3)
    pub capture_max_attempts: usize,

    /// Timeout for the initial page navigation (default: 30s)
    pub navigation_timeout: Duration,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Custom User-Agent string for requests (default: Chrome default)
    pub user_agent: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            settle_delay: Duration::from_millis(350),
            scroll_settle_timeout: Duration::from_secs(2),
            scroll_poll_interval: Duration::from_millis(50),
            capture_max_attempts: 3,
            navigation_timeout: Duration::from_secs(30),
            chrome_path: None,
            user_agent: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err("Viewport dimensions must be greater than 0".to_string());
        }
        if self.capture_max_attempts == 0 {
            return Err("Capture attempts must be greater than 0".to_string());
        }
        if self.navigation_timeout.as_secs() == 0 {
            return Err("Navigation timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Browser viewport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Viewport {
    /// Viewport width in pixels (default: 1280)
    pub width: u32,

    /// Viewport height in pixels (default: 800)
    pub height: u32,

    /// Device pixel ratio for high-DPI displays (default: 1.0)
    pub device_scale_factor: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            device_scale_factor: 1.0,
        }
    }
}

/// Options for a single capture run. Immutable for the duration of the run.
///
/// # Examples
///
/// ```rust
/// use pagestitch::{CaptureOptions, OutputFormat};
///
/// let options = CaptureOptions {
///     format: OutputFormat::Jpeg,
///     quality: 0.8,
///     ..Default::default()
/// };
/// assert!(options.full_page);
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureOptions {
    /// Encoding quality in [0, 1]; only meaningful for JPEG output
    pub quality: f32,

    /// Output artifact format
    pub format: OutputFormat,

    /// Capture the whole scrollable page (tiled) rather than one viewport
    pub full_page: bool,

    /// Hide the page scrollbar before capturing (cosmetic, best-effort)
    pub hide_scrollbar: bool,

    /// Wait for in-viewport images to finish loading before the first capture
    pub wait_for_images: bool,

    /// Inter-tile pacing applied between captures
    pub capture_speed: CaptureSpeed,

    /// Page size for document export
    pub document_page_size: DocumentPageSize,

    /// Orientation for document export
    pub document_orientation: DocumentOrientation,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            quality: 0.92,
            format: OutputFormat::Png,
            full_page: true,
            hide_scrollbar: true,
            wait_for_images: false,
            capture_speed: CaptureSpeed::Medium,
            document_page_size: DocumentPageSize::A4,
            document_orientation: DocumentOrientation::Portrait,
        }
    }
}

/// Output artifact formats.
///
/// `Png` and `Jpeg` deliver the composite raster directly; `Document` wraps
/// the composite in a print-ready page for the host to finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum OutputFormat {
    Png,
    Jpeg,
    Document,
}

impl OutputFormat {
    /// The raster format actually captured and composited. Document export
    /// rides on a PNG composite.
    pub fn raster(&self) -> RasterFormat {
        match self {
            OutputFormat::Jpeg => RasterFormat::Jpeg,
            OutputFormat::Png | OutputFormat::Document => RasterFormat::Png,
        }
    }
}

/// Raster image formats understood by the capture backend and compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Png,
    Jpeg,
}

impl RasterFormat {
    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            RasterFormat::Png => image::ImageFormat::Png,
            RasterFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg => "jpg",
        }
    }
}

/// Inter-capture pacing presets.
///
/// Slower speeds give heavy pages more time to repaint between tiles and
/// stay further under the capture backend's per-second quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum CaptureSpeed {
    Slow,
    Medium,
    Fast,
}

impl CaptureSpeed {
    pub fn pacing(&self) -> Duration {
        match self {
            CaptureSpeed::Slow => Duration::from_millis(1000),
            CaptureSpeed::Medium => Duration::from_millis(500),
            CaptureSpeed::Fast => Duration::from_millis(200),
        }
    }
}

/// Page sizes for document export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum DocumentPageSize {
    A4,
    Letter,
    Legal,
}

impl DocumentPageSize {
    /// CSS `@page` size keyword.
    pub fn css_keyword(&self) -> &'static str {
        match self {
            DocumentPageSize::A4 => "A4",
            DocumentPageSize::Letter => "letter",
            DocumentPageSize::Legal => "legal",
        }
    }
}

/// Orientation for document export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum DocumentOrientation {
    Portrait,
    Landscape,
}

impl DocumentOrientation {
    pub fn css_keyword(&self) -> &'static str {
        match self {
            DocumentOrientation::Portrait => "portrait",
            DocumentOrientation::Landscape => "landscape",
        }
    }
}

/// Dimensions of the page and viewport, snapshotted once at capture start.
///
/// The capture plan is computed from this point-in-time snapshot and is not
/// re-validated mid-run: pages that reflow during capture (lazy-loaded
/// content, responsive breakpoints) can produce misaligned tiles.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PageMetrics {
    pub scroll_width: u32,
    pub scroll_height: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_pixel_ratio: f64,
}

/// Generate Chrome command-line arguments for a capture session.
///
/// Unique temp and profile directories keyed by pid avoid Chrome's process
/// singleton when several sessions run on one machine.
pub fn get_chrome_args(config: &Config) -> Vec<String> {
    let unique_id = format!("{}-{}", std::process::id(), uuid::Uuid::new_v4());

    let mut args = vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        ),
        format!("--user-data-dir=/tmp/pagestitch-profile-{}", unique_id),
        format!("--temp-dir=/tmp/pagestitch-temp-{}", unique_id),
    ];

    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args
}

pub fn create_browser_config(config: &Config) -> chromiumoxide::browser::BrowserConfig {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .window_size(config.viewport.width, config.viewport.height)
        .args(get_chrome_args(config));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder
        .build()
        .unwrap_or_else(|_| BrowserConfig::with_executable("/usr/bin/chromium"))
}
