//! CLI binary for pdf2img.
//!
//! A thin shim over the library crate. Each URL is treated as one
//! attachment of a single message; delivered batches are written to
//! `--out-dir/message_NNN/` in the order a chat platform would receive them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2img::{
    convert_message, Attachment, ConversionConfig, DeliverySink, ImageFormat, JobOutcome,
    Pipeline, PlatformError, RasterEngine,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── Directory-backed delivery sink ───────────────────────────────────────────

/// Stands in for a chat conversation: every outbound message becomes a
/// numbered directory, and the pending reply is a terminal spinner.
struct DirectorySink {
    out_dir: PathBuf,
    messages: AtomicUsize,
    status: ProgressBar,
    last_status: Mutex<Option<String>>,
}

impl DirectorySink {
    fn new(out_dir: PathBuf, show_progress: bool) -> Self {
        let status = if show_progress {
            let bar = ProgressBar::new_spinner();
            let style = ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        } else {
            ProgressBar::hidden()
        };

        Self {
            out_dir,
            messages: AtomicUsize::new(0),
            status,
            last_status: Mutex::new(None),
        }
    }

    fn last_status(&self) -> Option<String> {
        self.last_status.lock().ok().and_then(|s| s.clone())
    }

    async fn write_message(&self, kind: &str, files: &[PathBuf]) -> Result<(), PlatformError> {
        let n = self.messages.fetch_add(1, Ordering::SeqCst) + 1;
        let dir = self.out_dir.join(format!("message_{n:03}"));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PlatformError::new(format!("{}: {e}", dir.display())))?;

        for file in files {
            let name = file
                .file_name()
                .ok_or_else(|| PlatformError::new(format!("not a file: {}", file.display())))?;
            tokio::fs::copy(file, dir.join(name))
                .await
                .map_err(|e| PlatformError::new(format!("{}: {e}", file.display())))?;
        }

        self.status.println(format!(
            "  {} message {:03}  {:<9}  {}",
            green("✓"),
            n,
            kind,
            dim(&format!("{} images", files.len())),
        ));
        Ok(())
    }
}

#[async_trait]
impl DeliverySink for DirectorySink {
    async fn reply_with_files(
        &self,
        files: &[PathBuf],
        _mention_replied_user: bool,
    ) -> Result<(), PlatformError> {
        self.write_message("reply", files).await
    }

    async fn send_follow_up_with_files(&self, files: &[PathBuf]) -> Result<(), PlatformError> {
        self.write_message("follow-up", files).await
    }

    async fn edit_pending_reply(&self, text: &str) -> Result<(), PlatformError> {
        self.status.set_message(text.to_string());
        if let Ok(mut last) = self.last_status.lock() {
            *last = Some(text.to_string());
        }
        Ok(())
    }

    async fn delete_pending_reply(&self) -> Result<(), PlatformError> {
        self.status.finish_and_clear();
        if let Ok(mut last) = self.last_status.lock() {
            *last = None;
        }
        Ok(())
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert one PDF; images land in ./pdf2img-out/message_001/ …
  pdf2img https://example.com/slides.pdf

  # Several attachments, 10 images per message, PNG output
  pdf2img --max-files 10 --format png https://a.example/1.pdf https://b.example/2.pdf

  # Use ImageMagick instead of pdfium
  pdf2img --engine imagemagick --magick-program magick https://example.com/scan.pdf

  # Machine-readable report
  pdf2img --json https://example.com/slides.pdf > report.json

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  PDF2IMG_*               Every flag has a PDF2IMG_ equivalent (see --help)
  RUST_LOG                Override the log filter
"#;

/// Rasterise PDF URLs into page images, batched the way a chat bot posts them.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2img",
    version,
    about = "Rasterise PDF URLs into page images, batched as chat messages",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// HTTP/HTTPS URLs of the PDF attachments.
    #[arg(required = true)]
    urls: Vec<String>,

    /// Directory that receives one sub-directory per delivered message.
    #[arg(short, long, env = "PDF2IMG_OUT_DIR", default_value = "pdf2img-out")]
    out_dir: PathBuf,

    /// Maximum images per message (1–10).
    #[arg(long, env = "PDF2IMG_MAX_FILES", default_value_t = 9,
          value_parser = clap::value_parser!(u8).range(1..=10))]
    max_files: u8,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDF2IMG_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Output image format.
    #[arg(long, env = "PDF2IMG_FORMAT", value_enum, default_value = "webp")]
    format: FormatArg,

    /// Conversion engine.
    #[arg(long, env = "PDF2IMG_ENGINE", value_enum, default_value = "pdfium")]
    engine: EngineArg,

    /// ImageMagick executable when --engine imagemagick.
    #[arg(long, env = "PDF2IMG_MAGICK_PROGRAM", default_value = "convert")]
    magick_program: String,

    /// Path to libpdfium (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Keep transparency instead of flattening onto white.
    #[arg(long, env = "PDF2IMG_KEEP_ALPHA")]
    keep_alpha: bool,

    /// Directory for job workspaces (default: system temp dir).
    #[arg(long, env = "PDF2IMG_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Accept .PDF / .Pdf names as well as .pdf.
    #[arg(long, env = "PDF2IMG_CASE_INSENSITIVE")]
    case_insensitive: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2IMG_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Conversion timeout in seconds.
    #[arg(long, env = "PDF2IMG_CONVERSION_TIMEOUT", default_value_t = 300)]
    conversion_timeout: u64,

    /// Output the invocation report as JSON.
    #[arg(long, env = "PDF2IMG_JSON")]
    json: bool,

    /// Disable the status spinner.
    #[arg(long, env = "PDF2IMG_NO_PROGRESS")]
    no_progress: bool,

    /// Skip the HEAD request that records each document's size for verification.
    #[arg(long, env = "PDF2IMG_NO_SIZE_CHECK")]
    no_size_check: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2IMG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2IMG_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Png,
    Webp,
}

impl From<FormatArg> for ImageFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Png => ImageFormat::Png,
            FormatArg::Webp => ImageFormat::Webp,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EngineArg {
    Pdfium,
    Imagemagick,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let mut attachments = cli
        .urls
        .iter()
        .map(|url| attachment_from_url(url))
        .collect::<Result<Vec<_>>>()?;

    if !cli.no_size_check {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cli.download_timeout))
            .build()
            .context("Failed to build HTTP client")?;
        for attachment in &mut attachments {
            if let Some(size) = declared_size(&client, &attachment.url).await {
                *attachment = attachment.clone().with_size(size);
            }
        }
    }

    let config = build_config(&cli)?;
    let pipeline = Pipeline::new(config).context("Failed to initialise pipeline")?;

    // ── Ctrl-C cancels the invocation; cleanup still runs ────────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let sink = DirectorySink::new(cli.out_dir.clone(), show_progress);
    let report = convert_message(&pipeline, &attachments, &sink, &cancel)
        .await
        .context("Conversion failed")?;
    sink.status.finish_and_clear();

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        for result in &report.results {
            match &result.outcome {
                JobOutcome::Success(s) => eprintln!(
                    "{} {}  {} images in {} messages  {}",
                    green("✔"),
                    bold(&result.attachment_name),
                    s.images,
                    s.messages,
                    dim(&format!("{}ms", result.duration_ms)),
                ),
                JobOutcome::Failure(e) => eprintln!(
                    "{} {}  {}",
                    red("✘"),
                    bold(&result.attachment_name),
                    red(&e.to_string()),
                ),
            }
        }
        if report.images_delivered() > 0 {
            eprintln!(
                "   {} images  →  {}",
                report.images_delivered(),
                bold(&cli.out_dir.display().to_string())
            );
        }
    }

    if report.results.is_empty() {
        anyhow::bail!(
            "{}",
            sink.last_status()
                .unwrap_or_else(|| "Nothing to convert".to_string())
        );
    }
    if !report.all_succeeded() {
        anyhow::bail!(
            "{}/{} PDFs failed",
            report.failed(),
            report.results.len()
        );
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli) -> Result<ConversionConfig> {
    let engine = match cli.engine {
        EngineArg::Pdfium => RasterEngine::Pdfium,
        EngineArg::Imagemagick => RasterEngine::ImageMagick {
            program: cli.magick_program.clone(),
        },
    };

    let mut builder = ConversionConfig::builder()
        .max_files_per_message(cli.max_files as usize)
        .dpi(cli.dpi)
        .image_format(cli.format.into())
        .remove_alpha(!cli.keep_alpha)
        .engine(engine)
        .case_insensitive_extension(cli.case_insensitive)
        .download_timeout_secs(cli.download_timeout)
        .conversion_timeout_secs(cli.conversion_timeout);

    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(path);
    }
    if let Some(ref dir) = cli.temp_dir {
        builder = builder.temp_root(dir);
    }

    builder.build().context("Invalid configuration")
}

/// Treat a URL as a chat attachment, naming it after the last path segment.
fn attachment_from_url(url: &str) -> Result<Attachment> {
    let parsed =
        reqwest::Url::parse(url).with_context(|| format!("Invalid URL '{url}'"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("Only HTTP/HTTPS URLs are supported, got '{url}'");
    }

    let name = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|last| !last.is_empty() && last.contains('.'))
        .map(|last| file_name_only(last).to_string())
        .unwrap_or_else(|| "document.pdf".to_string());

    Ok(Attachment::new(name, url))
}

/// The size the server announces for `url`, as a chat platform would report it.
///
/// Read from the raw header: the body of a HEAD response is always empty.
async fn declared_size(client: &reqwest::Client, url: &str) -> Option<u64> {
    let response = client.head(url).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    response
        .headers()
        .get(reqwest::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
        .filter(|&n| n > 0)
}

fn file_name_only(segment: &str) -> &str {
    Path::new(segment)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(segment)
}
