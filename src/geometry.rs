//! Tile grid planning
//!
//! Computes the grid of viewport-sized capture tiles from a `PageMetrics`
//! snapshot. Offsets are clamped so the final row/column never scrolls past
//! the document end; the last tile's actual size equals the true remaining
//! content, avoiding both blank margins and double-counted overlap in the
//! composite.

use crate::{CaptureError, PageMetrics};

/// One planned capture cell: where to scroll and how much content the
/// resulting capture actually covers. Edge tiles may be smaller than the
/// viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlan {
    pub grid_x: u32,
    pub grid_y: u32,
    pub scroll_x: u32,
    pub scroll_y: u32,
    pub width: u32,
    pub height: u32,
}

/// The planned capture grid, in row-major order (y outer, x inner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    pub columns: u32,
    pub rows: u32,
    tiles: Vec<TilePlan>,
}

impl TileGrid {
    pub fn total_tiles(&self) -> usize {
        self.tiles.len()
    }

    pub fn tiles(&self) -> &[TilePlan] {
        &self.tiles
    }
}

/// Plan the capture grid for a page.
///
/// `columns = max(1, ceil(scroll_width / viewport_width))`, with each
/// column's offset clamped to `max(0, scroll_width - viewport_width)` and
/// its actual width set to the content remaining past the offset; rows are
/// symmetric. A page no larger than the viewport yields a single tile.
///
/// Deterministic: identical metrics always produce an identical grid.
pub fn plan_grid(metrics: &PageMetrics) -> Result<TileGrid, CaptureError> {
    if metrics.viewport_width == 0 || metrics.viewport_height == 0 {
        return Err(CaptureError::InvalidGeometry(format!(
            "viewport is {}x{}",
            metrics.viewport_width, metrics.viewport_height
        )));
    }

    let columns = axis_count(metrics.scroll_width, metrics.viewport_width);
    let rows = axis_count(metrics.scroll_height, metrics.viewport_height);

    let mut tiles = Vec::with_capacity((columns * rows) as usize);
    for row in 0..rows {
        let (scroll_y, height) =
            axis_cell(row, metrics.scroll_height, metrics.viewport_height);
        for col in 0..columns {
            let (scroll_x, width) =
                axis_cell(col, metrics.scroll_width, metrics.viewport_width);
            tiles.push(TilePlan {
                grid_x: col,
                grid_y: row,
                scroll_x,
                scroll_y,
                width,
                height,
            });
        }
    }

    Ok(TileGrid {
        columns,
        rows,
        tiles,
    })
}

fn axis_count(scroll: u32, viewport: u32) -> u32 {
    if scroll <= viewport {
        1
    } else {
        (scroll + viewport - 1) / viewport
    }
}

/// Clamped offset and actual size for one cell along an axis.
fn axis_cell(index: u32, scroll: u32, viewport: u32) -> (u32, u32) {
    let max_offset = scroll.saturating_sub(viewport);
    let offset = (index as u64 * viewport as u64).min(max_offset as u64) as u32;
    let actual = viewport.min(scroll - offset);
    (offset, actual)
}
