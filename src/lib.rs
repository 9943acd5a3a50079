//! # pagestitch
//!
//! Captures a webpage as a sequence of viewport-sized screenshots, stitches
//! them into one coherent image, and exports the result as a raster image or
//! a print-ready document.
//!
//! The core is the segmented capture pipeline: planning the tile grid from
//! the page's dimensions, scrolling and capturing each tile under the
//! backend's rate limit, and reassembling the tiles into one
//! correctly-positioned composite. The capture backend, page scripting,
//! download sink, and status display are external collaborators behind
//! traits; a Chromium DevTools implementation ships in [`cdp`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pagestitch::{
//!     CaptureMetrics, CaptureOptions, CaptureService, CdpSession, Config, LogStatusSink,
//! };
//!
//! # struct DropSink;
//! # #[async_trait::async_trait]
//! # impl pagestitch::DownloadSink for DropSink {
//! #     async fn save(&self, _: &[u8], _: &str, _: bool) -> Result<(), pagestitch::ExportSinkError> { Ok(()) }
//! # }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let session = CdpSession::launch(&config, "https://example.com").await?;
//!     let primitives = session.primitives();
//!
//!     let service = CaptureService::new(
//!         primitives.clone(),
//!         primitives,
//!         Arc::new(DropSink),
//!         Arc::new(LogStatusSink),
//!         Arc::new(CaptureMetrics::new()),
//!         config,
//!     );
//!     let outcome = service.run(CaptureOptions::default()).await?;
//!     println!("captured {} ({}x{})", outcome.filename, outcome.width, outcome.height);
//!
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Full-page PNG
//! pagestitch capture --url https://example.com --output-dir shots/
//!
//! # Print-ready document, landscape letter
//! pagestitch capture --url https://example.com --format document \
//!     --page-size letter --landscape
//! ```

/// Configuration, capture options, and page metrics
pub mod config;

/// Error taxonomy for capture runs
pub mod error;

/// Tile grid planning
pub mod geometry;

/// Rate-limited viewport capture
pub mod capturer;

/// Page scrolling with settle confirmation
pub mod scroller;

/// Progress and status notifications
pub mod status;

/// The scroll/settle/capture loop over the tile grid
pub mod orchestrator;

/// Tile assembly, downscaling, and encoding
pub mod compositor;

/// Raster and document export
pub mod export;

/// Capture run lifecycle and single-flight guard
pub mod service;

/// Chromium DevTools implementations of the capture primitives
pub mod cdp;

/// Command-line interface implementation
pub mod cli;

/// Performance metrics collection
pub mod metrics;

/// Utility functions and helpers
pub mod utils;


pub use capturer::*;
pub use cdp::*;
pub use cli::*;
pub use compositor::*;
pub use config::*;
pub use error::*;
pub use export::*;
pub use geometry::*;
pub use metrics::*;
pub use orchestrator::*;
pub use scroller::*;
pub use service::*;
pub use status::*;
pub use utils::*;
