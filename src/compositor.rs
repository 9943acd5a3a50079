//! Tile compositing
//!
//! Lays captured tiles onto a single canvas at their planned offsets and
//! serializes the result to an encoded image. A page whose composite would
//! exceed the maximum single-surface dimension is scaled down; below a 10%
//! scale the result is judged unusable and the composite fails loudly
//! rather than degrading silently.

use futures::future::join_all;
use image::imageops::FilterType;
use image::{imageops, DynamicImage, RgbaImage};
use std::io::Cursor;
use std::time::Duration;
use tokio::task::spawn_blocking;
use tokio::time::timeout;
use tracing::debug;

use crate::{CaptureError, RasterFormat, Tile};

/// Maximum supported dimension of the rendering surface, per side.
pub const MAX_CANVAS_DIM: u32 = 32_767;

/// Downscaling below this factor destroys usability; fail instead.
pub const MIN_COMPOSITE_SCALE: f64 = 0.1;

/// Bounded wait for a single tile decode.
const TILE_DECODE_TIMEOUT: Duration = Duration::from_secs(10);

/// The assembled page image.
#[derive(Debug, Clone)]
pub struct Composite {
    pub encoded: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// < 1 only when the unscaled composite would exceed `MAX_CANVAS_DIM`.
    pub scale: f64,
}

/// Scale factor needed to fit a `total_width` x `total_height` canvas within
/// the maximum surface dimension.
pub fn compute_scale(total_width: u32, total_height: u32) -> Result<f64, CaptureError> {
    if total_width <= MAX_CANVAS_DIM && total_height <= MAX_CANVAS_DIM {
        return Ok(1.0);
    }

    let max = MAX_CANVAS_DIM as f64;
    let scale = (max / total_width as f64)
        .min(max / total_height as f64)
        .min(1.0);

    if scale < MIN_COMPOSITE_SCALE {
        return Err(CaptureError::PageTooLarge { scale });
    }
    Ok(scale)
}

pub struct Compositor;

impl Compositor {
    /// Assemble an ordered tile set into one encoded image.
    ///
    /// The first tile's declared size is the canonical per-cell stride; edge
    /// tiles are drawn at their own actual size but positioned at the
    /// regular stride offset. Cells never overlap, so draws are independent
    /// and order-insensitive; tile decode runs concurrently under a
    /// per-tile timeout.
    pub async fn assemble(
        tiles: &[Tile],
        format: RasterFormat,
        quality: f32,
    ) -> Result<Composite, CaptureError> {
        let first = tiles.first().ok_or_else(|| {
            CaptureError::IncompleteCapture("no tiles to composite".to_string())
        })?;
        let (stride_w, stride_h) = (first.width, first.height);

        let max_gx = tiles.iter().map(|t| t.grid_x).max().unwrap_or(0);
        let max_gy = tiles.iter().map(|t| t.grid_y).max().unwrap_or(0);
        let total_width = (max_gx + 1) * stride_w;
        let total_height = (max_gy + 1) * stride_h;

        let scale = compute_scale(total_width, total_height)?;
        let canvas_w = scaled(total_width, scale);
        let canvas_h = scaled(total_height, scale);

        debug!(
            "compositing {} tiles onto {}x{} canvas (scale {:.3})",
            tiles.len(),
            canvas_w,
            canvas_h,
            scale
        );

        let decoded = decode_tiles(tiles).await?;

        let mut canvas = RgbaImage::new(canvas_w, canvas_h);
        for (tile, img) in tiles.iter().zip(decoded) {
            let x = (tile.grid_x as f64 * stride_w as f64 * scale).round() as i64;
            let y = (tile.grid_y as f64 * stride_h as f64 * scale).round() as i64;

            if (scale - 1.0).abs() < f64::EPSILON {
                imageops::overlay(&mut canvas, &img.to_rgba8(), x, y);
            } else {
                let w = scaled(tile.width, scale);
                let h = scaled(tile.height, scale);
                let resized = imageops::resize(&img.to_rgba8(), w, h, FilterType::Triangle);
                imageops::overlay(&mut canvas, &resized, x, y);
            }
        }

        let encoded = encode_canvas(canvas, format, quality)?;

        Ok(Composite {
            encoded,
            width: canvas_w,
            height: canvas_h,
            scale,
        })
    }
}

fn scaled(dim: u32, scale: f64) -> u32 {
    ((dim as f64 * scale).round() as u32).max(1)
}

/// Decode all tiles concurrently, each under its own bounded wait.
async fn decode_tiles(tiles: &[Tile]) -> Result<Vec<DynamicImage>, CaptureError> {
    let futures = tiles.iter().enumerate().map(|(index, tile)| {
        let data = tile.image_data.clone();
        async move {
            let decode = spawn_blocking(move || image::load_from_memory(&data));
            match timeout(TILE_DECODE_TIMEOUT, decode).await {
                Err(_) => Err(CaptureError::TileDecodeFailed {
                    index,
                    reason: format!("decode timed out after {TILE_DECODE_TIMEOUT:?}"),
                }),
                Ok(Err(join_err)) => Err(CaptureError::TileDecodeFailed {
                    index,
                    reason: join_err.to_string(),
                }),
                Ok(Ok(Err(img_err))) => Err(CaptureError::TileDecodeFailed {
                    index,
                    reason: img_err.to_string(),
                }),
                Ok(Ok(Ok(img))) => Ok(img),
            }
        }
    });

    join_all(futures).await.into_iter().collect()
}

fn encode_canvas(
    canvas: RgbaImage,
    format: RasterFormat,
    quality: f32,
) -> Result<Vec<u8>, CaptureError> {
    let mut encoded = Vec::new();
    match format {
        RasterFormat::Png => {
            DynamicImage::ImageRgba8(canvas)
                .write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)
                .map_err(|e| CaptureError::CaptureFailed(format!("PNG encode failed: {e}")))?;
        }
        RasterFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
            let q = (quality.clamp(0.0, 1.0) * 100.0).max(1.0) as u8;
            let mut cursor = Cursor::new(&mut encoded);
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, q);
            encoder
                .encode_image(&rgb)
                .map_err(|e| CaptureError::CaptureFailed(format!("JPEG encode failed: {e}")))?;
        }
    }
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::time::SystemTime;

    fn solid_tile(gx: u32, gy: u32, w: u32, h: u32, color: [u8; 4]) -> Tile {
        let img = RgbaImage::from_pixel(w, h, Rgba(color));
        let mut data = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
            .unwrap();

        Tile {
            grid_x: gx,
            grid_y: gy,
            scroll_x: gx * w,
            scroll_y: gy * h,
            width: w,
            height: h,
            image_data: data,
            captured_at: SystemTime::now(),
        }
    }

    #[test]
    fn test_scale_identity_within_limit() {
        assert_eq!(compute_scale(1920, 10_000).unwrap(), 1.0);
        assert_eq!(compute_scale(MAX_CANVAS_DIM, MAX_CANVAS_DIM).unwrap(), 1.0);
    }

    #[test]
    fn test_scale_for_oversized_canvas() {
        // 3x3 grid of 20000px tiles: 60000 total on each side.
        let scale = compute_scale(60_000, 60_000).unwrap();
        assert!((scale - 0.546).abs() < 0.001, "scale was {scale}");
    }

    #[test]
    fn test_scale_below_floor_fails() {
        let result = compute_scale(400_000, 1000);
        assert!(matches!(result, Err(CaptureError::PageTooLarge { scale }) if scale < 0.1));
    }

    #[tokio::test]
    async fn test_assembles_grid_at_planned_offsets() {
        let tiles = vec![
            solid_tile(0, 0, 4, 4, [255, 0, 0, 255]),
            solid_tile(1, 0, 4, 4, [0, 255, 0, 255]),
            solid_tile(0, 1, 4, 4, [0, 0, 255, 255]),
            solid_tile(1, 1, 4, 4, [255, 255, 0, 255]),
        ];

        let composite = Compositor::assemble(&tiles, RasterFormat::Png, 1.0)
            .await
            .unwrap();
        assert_eq!((composite.width, composite.height), (8, 8));
        assert_eq!(composite.scale, 1.0);

        let img = image::load_from_memory(&composite.encoded).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(img.get_pixel(7, 0), &Rgba([0, 255, 0, 255]));
        assert_eq!(img.get_pixel(0, 7), &Rgba([0, 0, 255, 255]));
        assert_eq!(img.get_pixel(7, 7), &Rgba([255, 255, 0, 255]));
    }

    #[tokio::test]
    async fn test_shorter_edge_tile_keeps_stride_position() {
        // Bottom row is a 4x2 edge tile; canvas height still uses the
        // full-tile stride of the first row.
        let tiles = vec![
            solid_tile(0, 0, 4, 4, [10, 10, 10, 255]),
            solid_tile(0, 1, 4, 2, [200, 200, 200, 255]),
        ];

        let composite = Compositor::assemble(&tiles, RasterFormat::Png, 1.0)
            .await
            .unwrap();
        assert_eq!((composite.width, composite.height), (4, 8));

        let img = image::load_from_memory(&composite.encoded).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(0, 4), &Rgba([200, 200, 200, 255]));
        // Below the short tile the canvas stays blank.
        assert_eq!(img.get_pixel(0, 7), &Rgba([0, 0, 0, 0]));
    }

    #[tokio::test]
    async fn test_undecodable_tile_fails_with_index() {
        let mut tiles = vec![
            solid_tile(0, 0, 4, 4, [1, 2, 3, 255]),
            solid_tile(1, 0, 4, 4, [4, 5, 6, 255]),
        ];
        tiles[1].image_data = vec![0xde, 0xad, 0xbe, 0xef];

        let result = Compositor::assemble(&tiles, RasterFormat::Png, 1.0).await;
        assert!(matches!(
            result,
            Err(CaptureError::TileDecodeFailed { index: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_jpeg_encoding_respects_format() {
        let tiles = vec![solid_tile(0, 0, 8, 8, [120, 130, 140, 255])];
        let composite = Compositor::assemble(&tiles, RasterFormat::Jpeg, 0.8)
            .await
            .unwrap();

        assert_eq!(
            image::guess_format(&composite.encoded).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[tokio::test]
    async fn test_empty_tile_set_is_rejected() {
        let result = Compositor::assemble(&[], RasterFormat::Png, 1.0).await;
        assert!(matches!(result, Err(CaptureError::IncompleteCapture(_))));
    }
}
