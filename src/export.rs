//! Artifact export
//!
//! Turns the composite (or a single unsegmented capture) into a
//! downloadable artifact. Raster formats deliver the encoded bytes
//! directly; document export wraps the composite in a minimal print-ready
//! page and leaves the actual document encoding to the host's
//! print-to-file capability.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::{
    CaptureError, CaptureOptions, Composite, OutputFormat, Severity, StatusSink,
};

#[derive(Debug, Clone, Error)]
#[error("save failed: {0}")]
pub struct ExportSinkError(pub String);

/// The external download/export sink.
#[async_trait]
pub trait DownloadSink: Send + Sync {
    async fn save(
        &self,
        bytes: &[u8],
        filename: &str,
        prompt_user: bool,
    ) -> Result<(), ExportSinkError>;
}

/// Timestamped export filename: ISO-8601 to seconds, colons replaced with
/// dashes so the name is valid on every filesystem.
pub fn export_filename(extension: &str, timestamp: DateTime<Utc>) -> String {
    format!(
        "screenshot_{}.{}",
        timestamp.format("%Y-%m-%dT%H-%M-%S"),
        extension
    )
}

pub struct ExportAdapter {
    sink: Arc<dyn DownloadSink>,
    status: Arc<dyn StatusSink>,
}

impl ExportAdapter {
    pub fn new(sink: Arc<dyn DownloadSink>, status: Arc<dyn StatusSink>) -> Self {
        Self { sink, status }
    }

    /// Deliver the composite in the requested format. Returns the filename
    /// handed to the sink.
    pub async fn export(
        &self,
        composite: &Composite,
        options: &CaptureOptions,
    ) -> Result<String, CaptureError> {
        let now = Utc::now();
        match options.format {
            OutputFormat::Png | OutputFormat::Jpeg => {
                let filename = export_filename(options.format.raster().extension(), now);
                self.sink
                    .save(&composite.encoded, &filename, true)
                    .await
                    .map_err(|e| CaptureError::ExportFailed(e.to_string()))?;
                info!("exported {} ({} bytes)", filename, composite.encoded.len());
                Ok(filename)
            }
            OutputFormat::Document => {
                let wrapper = document_wrapper(composite, options);
                let filename = export_filename("html", now);
                self.sink
                    .save(wrapper.as_bytes(), &filename, true)
                    .await
                    .map_err(|e| CaptureError::ExportFailed(e.to_string()))?;
                self.status.message(
                    "Print-ready page saved; use the browser's print-to-file to finalize the document",
                    Severity::Info,
                );
                Ok(filename)
            }
        }
    }
}

/// Minimal styled page sized for printing, with the composite embedded as a
/// data URI. The host finalizes the document via its native print path.
fn document_wrapper(composite: &Composite, options: &CaptureOptions) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(&composite.encoded);
    let media_type = match options.format.raster() {
        crate::RasterFormat::Png => "image/png",
        crate::RasterFormat::Jpeg => "image/jpeg",
    };

    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <title>Captured page</title>\n\
         <style>\n\
         @page {{ size: {size} {orientation}; margin: 0; }}\n\
         html, body {{ margin: 0; padding: 0; }}\n\
         img {{ width: 100%; display: block; }}\n\
         </style>\n\
         </head>\n\
         <body>\n\
         <img src=\"data:{media_type};base64,{encoded}\" \
          width=\"{width}\" height=\"{height}\">\n\
         </body>\n\
         </html>\n",
        size = options.document_page_size.css_keyword(),
        orientation = options.document_orientation.css_keyword(),
        media_type = media_type,
        encoded = encoded,
        width = composite.width,
        height = composite.height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DocumentOrientation, DocumentPageSize, NullStatusSink};
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Records every save without touching the filesystem.
    pub(crate) struct MemorySink {
        pub saved: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl MemorySink {
        pub(crate) fn new() -> Self {
            Self {
                saved: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DownloadSink for MemorySink {
        async fn save(
            &self,
            bytes: &[u8],
            filename: &str,
            _prompt_user: bool,
        ) -> Result<(), ExportSinkError> {
            self.saved
                .lock()
                .unwrap()
                .push((filename.to_string(), bytes.to_vec()));
            Ok(())
        }
    }

    fn composite() -> Composite {
        Composite {
            encoded: vec![0x89, 0x50, 0x4e, 0x47],
            width: 1280,
            height: 4000,
            scale: 1.0,
        }
    }

    #[test]
    fn test_export_filename_shape() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 14, 30, 5).unwrap();
        assert_eq!(
            export_filename("png", ts),
            "screenshot_2024-03-09T14-30-05.png"
        );
        assert!(!export_filename("jpg", ts).contains(':'));
    }

    #[tokio::test]
    async fn test_raster_export_delivers_composite_bytes() {
        let sink = Arc::new(MemorySink::new());
        let adapter = ExportAdapter::new(sink.clone(), Arc::new(NullStatusSink));

        let filename = adapter
            .export(&composite(), &CaptureOptions::default())
            .await
            .unwrap();

        let saved = sink.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, filename);
        assert!(filename.ends_with(".png"));
        assert_eq!(saved[0].1, composite().encoded);
    }

    #[tokio::test]
    async fn test_document_export_wraps_composite() {
        let sink = Arc::new(MemorySink::new());
        let adapter = ExportAdapter::new(sink.clone(), Arc::new(NullStatusSink));

        let options = CaptureOptions {
            format: OutputFormat::Document,
            document_page_size: DocumentPageSize::Letter,
            document_orientation: DocumentOrientation::Landscape,
            ..Default::default()
        };
        let filename = adapter.export(&composite(), &options).await.unwrap();
        assert!(filename.ends_with(".html"));

        let saved = sink.saved.lock().unwrap();
        let html = String::from_utf8(saved[0].1.clone()).unwrap();
        assert!(html.contains("@page { size: letter landscape; margin: 0; }"));
        assert!(html.contains("data:image/png;base64,"));
    }
}
