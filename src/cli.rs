use crate::{
    format_bytes, format_duration, validate_url, CaptureMetrics, CaptureOptions, CaptureService,
    CaptureSpeed, CdpSession, Config, DocumentOrientation, DocumentPageSize, DownloadSink,
    ExportSinkError, OutputFormat, Severity, StatusSink,
};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "pagestitch")]
#[command(about = "Full-page web capture with tile stitching")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture one page
    Capture {
        #[arg(short, long, help = "URL to capture")]
        url: String,

        #[arg(short, long, default_value = ".", help = "Output directory")]
        output_dir: PathBuf,

        #[arg(long, help = "Output format (png, jpeg, document)")]
        format: Option<String>,

        #[arg(long, help = "Encoding quality, 0.0-1.0 (JPEG only)")]
        quality: Option<f32>,

        #[arg(long, help = "Capture speed (slow, medium, fast)")]
        speed: Option<String>,

        #[arg(long, help = "Capture only the visible viewport, no stitching")]
        viewport_only: bool,

        #[arg(long, help = "Viewport width")]
        width: Option<u32>,

        #[arg(long, help = "Viewport height")]
        height: Option<u32>,

        #[arg(long, help = "Leave the page scrollbar visible")]
        keep_scrollbar: bool,

        #[arg(long, help = "Wait for in-viewport images before capturing")]
        wait_for_images: bool,

        #[arg(long, help = "Document page size (a4, letter, legal)")]
        page_size: Option<String>,

        #[arg(long, help = "Landscape document orientation")]
        landscape: bool,
    },

    /// Capture every URL in a file, one run at a time
    Batch {
        #[arg(short, long, help = "Input file containing URLs (one per line)")]
        input: PathBuf,

        #[arg(short, long, default_value = ".", help = "Output directory")]
        output_dir: PathBuf,

        #[arg(long, help = "Output format (png, jpeg, document)")]
        format: Option<String>,

        #[arg(long, help = "Capture speed (slow, medium, fast)")]
        speed: Option<String>,

        #[arg(long, help = "Capture only the visible viewport, no stitching")]
        viewport_only: bool,
    },

    /// Validate a configuration file
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Default)]
pub struct CaptureFlags {
    pub format: Option<String>,
    pub quality: Option<f32>,
    pub speed: Option<String>,
    pub viewport_only: bool,
    pub keep_scrollbar: bool,
    pub wait_for_images: bool,
    pub page_size: Option<String>,
    pub landscape: bool,
}

impl CaptureFlags {
    pub fn into_options(self) -> anyhow::Result<CaptureOptions> {
        let format = match self.format.as_deref() {
            None | Some("png") => OutputFormat::Png,
            Some("jpeg") | Some("jpg") => OutputFormat::Jpeg,
            Some("document") | Some("pdf") => OutputFormat::Document,
            Some(other) => return Err(anyhow!("unknown format: {other}")),
        };

        let capture_speed = match self.speed.as_deref() {
            Some("slow") => CaptureSpeed::Slow,
            None | Some("medium") => CaptureSpeed::Medium,
            Some("fast") => CaptureSpeed::Fast,
            Some(other) => return Err(anyhow!("unknown capture speed: {other}")),
        };

        let document_page_size = match self.page_size.as_deref() {
            None | Some("a4") => DocumentPageSize::A4,
            Some("letter") => DocumentPageSize::Letter,
            Some("legal") => DocumentPageSize::Legal,
            Some(other) => return Err(anyhow!("unknown page size: {other}")),
        };

        let quality = self.quality.unwrap_or(0.92);
        if !(0.0..=1.0).contains(&quality) {
            return Err(anyhow!("quality must be between 0.0 and 1.0"));
        }

        Ok(CaptureOptions {
            quality,
            format,
            full_page: !self.viewport_only,
            hide_scrollbar: !self.keep_scrollbar,
            wait_for_images: self.wait_for_images,
            capture_speed,
            document_page_size,
            document_orientation: if self.landscape {
                DocumentOrientation::Landscape
            } else {
                DocumentOrientation::Portrait
            },
        })
    }
}

/// Writes exported artifacts into a directory. The CLI never prompts, so
/// `prompt_user` is ignored.
pub struct FileDownloadSink {
    output_dir: PathBuf,
}

impl FileDownloadSink {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }
}

#[async_trait]
impl DownloadSink for FileDownloadSink {
    async fn save(
        &self,
        bytes: &[u8],
        filename: &str,
        _prompt_user: bool,
    ) -> Result<(), ExportSinkError> {
        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| ExportSinkError(e.to_string()))?;

        let path = self.output_dir.join(filename);
        fs::write(&path, bytes)
            .await
            .map_err(|e| ExportSinkError(e.to_string()))?;

        info!("saved {} ({})", path.display(), format_bytes(bytes.len()));
        Ok(())
    }
}

/// Prints progress and messages to the terminal.
pub struct CliStatusSink;

impl StatusSink for CliStatusSink {
    fn progress(&self, percent: u8) {
        println!("Progress: {percent}%");
    }

    fn message(&self, text: &str, severity: Severity) {
        match severity {
            Severity::Info => println!("{text}"),
            Severity::Warning => eprintln!("warning: {text}"),
            Severity::Error => eprintln!("error: {text}"),
        }
    }
}

pub struct CliRunner {
    pub config: Config,
}

impl CliRunner {
    pub fn new(mut config: Config, args: &Cli) -> Self {
        if let Some(chrome_path) = &args.chrome_path {
            config.chrome_path = Some(chrome_path.clone());
        }
        Self { config }
    }

    pub async fn run(&self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::Capture {
                url,
                output_dir,
                format,
                quality,
                speed,
                viewport_only,
                width,
                height,
                keep_scrollbar,
                wait_for_images,
                page_size,
                landscape,
            } => {
                let mut config = self.config.clone();
                if let Some(width) = width {
                    config.viewport.width = width;
                }
                if let Some(height) = height {
                    config.viewport.height = height;
                }
                config
                    .validate()
                    .map_err(|e| anyhow!("invalid configuration: {e}"))?;

                let options = CaptureFlags {
                    format,
                    quality,
                    speed,
                    viewport_only,
                    keep_scrollbar,
                    wait_for_images,
                    page_size,
                    landscape,
                }
                .into_options()?;

                self.capture_url(&config, &url, options, &output_dir).await
            }
            Commands::Batch {
                input,
                output_dir,
                format,
                speed,
                viewport_only,
            } => {
                let options = CaptureFlags {
                    format,
                    speed,
                    viewport_only,
                    ..Default::default()
                }
                .into_options()?;
                self.run_batch(&input, &output_dir, options).await
            }
            Commands::Validate { config } => validate_config_file(&config).await,
        }
    }

    async fn capture_url(
        &self,
        config: &Config,
        url: &str,
        options: CaptureOptions,
        output_dir: &Path,
    ) -> anyhow::Result<()> {
        validate_url(url).map_err(|_| anyhow!("invalid URL: {url}"))?;

        info!("capturing {}", url);
        let session = CdpSession::launch(config, url).await?;
        let primitives = session.primitives();

        let service = CaptureService::new(
            primitives.clone(),
            primitives,
            Arc::new(FileDownloadSink::new(output_dir.to_path_buf())),
            Arc::new(CliStatusSink),
            Arc::new(CaptureMetrics::new()),
            config.clone(),
        );

        let outcome = service.run(options).await;
        session.shutdown().await;
        let outcome = outcome?;

        println!("Capture complete:");
        println!("  URL: {url}");
        println!("  Output: {}", outcome.filename);
        println!("  Dimensions: {}x{}", outcome.width, outcome.height);
        if outcome.scale < 1.0 {
            println!("  Downscaled to {:.1}% to fit the canvas limit", outcome.scale * 100.0);
        }
        println!("  Tiles: {}", outcome.tile_count);
        println!("  Duration: {}", format_duration(outcome.duration));

        Ok(())
    }

    async fn run_batch(
        &self,
        input: &Path,
        output_dir: &Path,
        options: CaptureOptions,
    ) -> anyhow::Result<()> {
        let content = fs::read_to_string(input)
            .await
            .with_context(|| format!("cannot read {}", input.display()))?;
        let urls: Vec<String> = content
            .lines()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| line.to_string())
            .collect();

        info!("batch of {} URLs", urls.len());

        // The capture backend is a serialized resource: runs go one at a
        // time, never in parallel.
        let mut success_count = 0;
        let mut error_count = 0;
        for url in &urls {
            match self.capture_url(&self.config, url, options.clone(), output_dir).await {
                Ok(()) => success_count += 1,
                Err(e) => {
                    error_count += 1;
                    warn!("failed to capture {}: {}", url, e);
                }
            }
        }

        info!(
            "batch finished. Success: {}, Errors: {}",
            success_count, error_count
        );
        Ok(())
    }
}

async fn validate_config_file(path: &Path) -> anyhow::Result<()> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let config: Config = serde_json::from_str(&content)?;
    config
        .validate()
        .map_err(|e| anyhow!("invalid configuration: {e}"))?;

    println!("Configuration is valid:");
    println!(
        "  Viewport: {}x{}",
        config.viewport.width, config.viewport.height
    );
    println!("  Settle delay: {:?}", config.settle_delay);
    println!("  Capture attempts: {}", config.capture_max_attempts);

    Ok(())
}

pub fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}
