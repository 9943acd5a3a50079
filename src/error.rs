use thiserror::Error;

/// Errors surfaced by a capture run.
///
/// Every variant is terminal for the run that produced it: the single-flight
/// guard is released, no partial artifact is delivered, and nothing here
/// triggers an automatic full-run retry. The only automatic retry in the
/// crate is the rate-limit backoff inside `RateLimitedCapturer`.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("Invalid page geometry: {0}")]
    InvalidGeometry(String),

    #[error("Capture retries exhausted after {attempts} attempts")]
    CaptureExhausted { attempts: usize },

    #[error("Tile ({x}, {y}) returned invalid image data: {reason}")]
    InvalidTileData { x: u32, y: u32, reason: String },

    #[error("Capture produced an incomplete tile set: {0}")]
    IncompleteCapture(String),

    #[error("Page too large to composite: required scale {scale:.3} is below the usable floor")]
    PageTooLarge { scale: f64 },

    #[error("Tile {index} failed to decode: {reason}")]
    TileDecodeFailed { index: usize, reason: String },

    #[error("A capture run is already in progress")]
    CaptureInProgress,

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("Capture failed: {0}")]
    CaptureFailed(String),
}

impl CaptureError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CaptureError::CaptureInProgress => ErrorSeverity::Low,
            CaptureError::PageTooLarge { .. } => ErrorSeverity::Medium,
            CaptureError::InvalidGeometry(_) => ErrorSeverity::High,
            CaptureError::IncompleteCapture(_) => ErrorSeverity::High,
            _ => ErrorSeverity::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::ExportFailed(err.to_string())
    }
}

impl From<serde_json::Error> for CaptureError {
    fn from(err: serde_json::Error) -> Self {
        CaptureError::CaptureFailed(err.to_string())
    }
}
