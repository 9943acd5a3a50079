//! Segmented capture orchestration
//!
//! Drives the scroll → settle → capture loop over the planned tile grid,
//! enforces inter-capture pacing, reports progress, and produces an ordered,
//! validated tile set for the compositor. Tile capture is strictly
//! sequential: all tiles share one page viewport, which can only show one
//! scroll position at a time.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::sleep;
use tracing::debug;

use crate::{
    plan_grid, CaptureError, CaptureMetrics, CaptureOptions, PageMetrics, PageScroller,
    RasterFormat, RateLimitedCapturer, StatusSink, TilePlan,
};

/// One captured tile: a viewport-sized image plus its grid position and the
/// actual content size it covers. Edge tiles may be smaller than the
/// viewport.
#[derive(Debug, Clone)]
pub struct Tile {
    pub grid_x: u32,
    pub grid_y: u32,
    pub scroll_x: u32,
    pub scroll_y: u32,
    pub width: u32,
    pub height: u32,
    pub image_data: Vec<u8>,
    pub captured_at: SystemTime,
}

/// Progress reserved for preparation; tile capture reports within the
/// remaining window up to 100.
const PROGRESS_FLOOR: u8 = 20;
const PROGRESS_SPAN: f64 = 80.0;

pub struct CaptureOrchestrator {
    capturer: RateLimitedCapturer,
    scroller: PageScroller,
    status: Arc<dyn StatusSink>,
    metrics: Arc<CaptureMetrics>,
    settle_delay: Duration,
}

impl CaptureOrchestrator {
    pub fn new(
        capturer: RateLimitedCapturer,
        scroller: PageScroller,
        status: Arc<dyn StatusSink>,
        metrics: Arc<CaptureMetrics>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            capturer,
            scroller,
            status,
            metrics,
            settle_delay,
        }
    }

    /// Capture every tile of the planned grid, in row-major order.
    ///
    /// Any tile failure aborts the whole run; partial tile sets are never
    /// returned. The result is sorted by (y, x) so assembly order is
    /// deterministic regardless of timing jitter during capture.
    pub async fn capture_tiles(
        &self,
        page_metrics: &PageMetrics,
        options: &CaptureOptions,
    ) -> Result<Vec<Tile>, CaptureError> {
        let grid = plan_grid(page_metrics)?;
        let total = grid.total_tiles();
        let format = options.format.raster();

        debug!(
            "capturing {} tiles ({}x{} grid)",
            total, grid.columns, grid.rows
        );

        let mut seen = HashSet::with_capacity(total);
        let mut tiles: Vec<Tile> = Vec::with_capacity(total);

        for (index, plan) in grid.tiles().iter().enumerate() {
            self.scroller.scroll_to(plan.scroll_x, plan.scroll_y).await?;
            sleep(self.settle_delay).await;

            let image_data = self.capturer.capture(format, options.quality).await?;
            validate_tile_image(&image_data, format, plan)?;

            // Should not occur under row-major traversal; guards against
            // retried or duplicated scheduling.
            if !seen.insert((plan.grid_x, plan.grid_y)) {
                return Err(CaptureError::IncompleteCapture(format!(
                    "duplicate tile at ({}, {})",
                    plan.grid_x, plan.grid_y
                )));
            }

            tiles.push(Tile {
                grid_x: plan.grid_x,
                grid_y: plan.grid_y,
                scroll_x: plan.scroll_x,
                scroll_y: plan.scroll_y,
                width: plan.width,
                height: plan.height,
                image_data,
                captured_at: SystemTime::now(),
            });
            self.metrics.record_tile();

            let completed = index + 1;
            let percent =
                (completed as f64 / total as f64 * PROGRESS_SPAN).round() as u8 + PROGRESS_FLOOR;
            self.status.progress(percent);

            if completed < total {
                sleep(options.capture_speed.pacing()).await;
            }
        }

        self.validate_tile_set(&tiles, total)?;

        tiles.sort_by_key(|t| (t.grid_y, t.grid_x));
        Ok(tiles)
    }

    fn validate_tile_set(&self, tiles: &[Tile], expected: usize) -> Result<(), CaptureError> {
        if tiles.len() != expected {
            return Err(CaptureError::IncompleteCapture(format!(
                "expected {} tiles, captured {}",
                expected,
                tiles.len()
            )));
        }

        for tile in tiles {
            if tile.width == 0 || tile.height == 0 {
                return Err(CaptureError::IncompleteCapture(format!(
                    "tile ({}, {}) has degenerate geometry {}x{}",
                    tile.grid_x, tile.grid_y, tile.width, tile.height
                )));
            }
            if tile.image_data.is_empty() {
                return Err(CaptureError::IncompleteCapture(format!(
                    "tile ({}, {}) has no image data",
                    tile.grid_x, tile.grid_y
                )));
            }
        }

        Ok(())
    }
}

/// Check that captured bytes decode as the format the backend was asked for.
fn validate_tile_image(
    data: &[u8],
    format: RasterFormat,
    plan: &TilePlan,
) -> Result<(), CaptureError> {
    image::load_from_memory_with_format(data, format.image_format()).map_err(|e| {
        CaptureError::InvalidTileData {
            x: plan.grid_x,
            y: plan.grid_y,
            reason: e.to_string(),
        }
    })?;
    Ok(())
}
