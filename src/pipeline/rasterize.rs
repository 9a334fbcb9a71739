//! Rasterization: turn the downloaded PDF into one image file per page.
//!
//! The engine is a black box behind [`Rasterizer`]. Two implementations ship:
//!
//! * [`PdfiumRasterizer`] — pdfium loaded in-process. pdfium is not
//!   async-safe, so the whole render runs inside `spawn_blocking`; the
//!   cancellation token is checked between pages because a blocking thread
//!   cannot be aborted from outside.
//! * [`CommandRasterizer`] — ImageMagick as a subprocess with
//!   `kill_on_drop`, so abandoning the future kills the child.
//!
//! Neither interprets the document. Whatever the engine says about a
//! malformed file is passed through verbatim in [`EngineError::Failed`].

use crate::config::{ConversionConfig, RasterEngine};
use crate::error::EngineError;
use crate::pipeline::pages::{collect_pages, OutputPattern, PageImage};
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Environment variable consulted when no pdfium path is configured.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// A conversion engine producing page images from a document.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Render every page of `input` into `output.dir`, named by `output`.
    ///
    /// Returns the produced images sorted by ascending page number.
    async fn rasterize(
        &self,
        input: &Path,
        output: &OutputPattern,
        cancel: &CancellationToken,
    ) -> Result<Vec<PageImage>, EngineError>;
}

/// Instantiate the engine selected in `config`.
pub fn from_config(config: &ConversionConfig) -> Arc<dyn Rasterizer> {
    match &config.engine {
        RasterEngine::Pdfium => Arc::new(PdfiumRasterizer::new(config)),
        RasterEngine::ImageMagick { program } => Arc::new(CommandRasterizer::new(program, config)),
    }
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// In-process rasterizer backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
    dpi: u32,
    max_pixels: u32,
    remove_alpha: bool,
}

impl PdfiumRasterizer {
    pub fn new(config: &ConversionConfig) -> Self {
        Self {
            library_path: config.pdfium_library_path.clone(),
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            remove_alpha: config.remove_alpha,
        }
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    fn name(&self) -> &str {
        "pdfium"
    }

    async fn rasterize(
        &self,
        input: &Path,
        output: &OutputPattern,
        cancel: &CancellationToken,
    ) -> Result<Vec<PageImage>, EngineError> {
        let engine = self.clone();
        let input = input.to_path_buf();
        let output = output.clone();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || engine.render_blocking(&input, &output, &cancel))
            .await
            .map_err(|e| EngineError::Failed(format!("Render task panicked: {}", e)))?
    }
}

impl PdfiumRasterizer {
    fn bind(&self) -> Result<Pdfium, EngineError> {
        let explicit = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from));

        let bindings = match explicit {
            Some(path) if path.is_dir() => {
                let lib = Pdfium::pdfium_platform_library_name_at_path(&path);
                Pdfium::bind_to_library(&lib)
            }
            Some(path) => Pdfium::bind_to_library(&path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| EngineError::Unavailable(format!("{:?}", e)))?;

        Ok(Pdfium::new(bindings))
    }

    fn render_blocking(
        &self,
        input: &Path,
        output: &OutputPattern,
        cancel: &CancellationToken,
    ) -> Result<Vec<PageImage>, EngineError> {
        let started = Instant::now();
        let pdfium = self.bind()?;

        let document = pdfium
            .load_pdf_from_file(input, None)
            .map_err(|e| EngineError::Failed(format!("{:?}", e)))?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);

        let max = self.max_pixels as i32;
        let mut results = Vec::with_capacity(total_pages);

        for (idx, page) in pages.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let page_number = idx + 1;

            let width = (page.width().value / 72.0 * self.dpi as f32).round() as i32;
            let render_config = PdfRenderConfig::new()
                .set_target_width(width.clamp(1, max))
                .set_maximum_height(max);

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                EngineError::Failed(format!("page {}: {:?}", page_number, e))
            })?;

            let image = bitmap.as_image();
            let image = if self.remove_alpha {
                DynamicImage::ImageRgb8(image.to_rgb8())
            } else {
                image
            };

            let path = output.path_for(page_number);
            image
                .save_with_format(&path, output.format.to_image_crate())
                .map_err(|e| {
                    EngineError::Failed(format!("encoding page {}: {}", page_number, e))
                })?;

            debug!(
                "Rendered page {} → {}x{} px",
                page_number,
                image.width(),
                image.height()
            );
            results.push(PageImage { page_number, path });
        }

        if results.is_empty() {
            return Err(EngineError::NoOutput);
        }

        info!(
            "Rendered {} pages in {}ms",
            results.len(),
            started.elapsed().as_millis()
        );
        Ok(results)
    }
}

// ── ImageMagick subprocess ───────────────────────────────────────────────

/// Rasterizer that shells out to ImageMagick.
///
/// Runs `{program} {leading_args…} -density {dpi} {input} [-background white -alpha remove]
/// -scene 1 +adjoin {dir}/{stem}_page_%03d.{ext}`.
#[derive(Debug, Clone)]
pub struct CommandRasterizer {
    program: String,
    leading_args: Vec<String>,
    dpi: u32,
    remove_alpha: bool,
}

impl CommandRasterizer {
    pub fn new(program: impl Into<String>, config: &ConversionConfig) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            dpi: config.dpi,
            remove_alpha: config.remove_alpha,
        }
    }

    /// Arguments placed before the conversion arguments, e.g. `["convert"]`
    /// for `magick convert …`.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    fn command(&self, input: &Path, output: &OutputPattern) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg("-density")
            .arg(self.dpi.to_string())
            .arg(input);
        if self.remove_alpha {
            cmd.args(["-background", "white", "-alpha", "remove"]);
        }
        cmd.args(["-scene", "1", "+adjoin"])
            .arg(output.template())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Rasterizer for CommandRasterizer {
    fn name(&self) -> &str {
        &self.program
    }

    async fn rasterize(
        &self,
        input: &Path,
        output: &OutputPattern,
        cancel: &CancellationToken,
    ) -> Result<Vec<PageImage>, EngineError> {
        let started = Instant::now();
        let child = self.command(input, output).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::Unavailable(format!("'{}' not found", self.program))
            } else {
                EngineError::Io(e)
            }
        })?;

        // Dropping `wait_with_output` drops the child, which kills it.
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("{} cancelled, killing child", self.program);
                return Err(EngineError::Cancelled);
            }
            result = child.wait_with_output() => result?,
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            let detail = if stderr.is_empty() {
                format!("{} exited with {}", self.program, result.status)
            } else {
                stderr
            };
            return Err(EngineError::Failed(detail));
        }

        let pages = collect_pages(&output.dir).await?;
        if pages.is_empty() {
            return Err(EngineError::NoOutput);
        }

        info!(
            "{} produced {} pages in {}ms",
            self.program,
            pages.len(),
            started.elapsed().as_millis()
        );
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageFormat;
    use std::time::Duration;

    fn sh_engine(script: &str) -> CommandRasterizer {
        CommandRasterizer::new("sh", &ConversionConfig::default())
            .with_leading_args(["-c", script, "convert"])
    }

    #[test]
    fn from_config_selects_engine() {
        let r = from_config(&ConversionConfig::default());
        assert_eq!(r.name(), "pdfium");

        let config = ConversionConfig::builder()
            .engine(RasterEngine::ImageMagick {
                program: "magick".into(),
            })
            .build()
            .unwrap();
        assert_eq!(from_config(&config).name(), "magick");
    }

    #[test]
    fn command_line_layout() {
        let engine = CommandRasterizer::new("convert", &ConversionConfig::default());
        let pattern = OutputPattern::new("/ws/doc_x", "doc", ImageFormat::Webp);
        let cmd = engine.command(Path::new("/ws/doc_x.pdf"), &pattern);
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            vec![
                "-density",
                "150",
                "/ws/doc_x.pdf",
                "-background",
                "white",
                "-alpha",
                "remove",
                "-scene",
                "1",
                "+adjoin",
                "/ws/doc_x/doc_page_%03d.webp",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn subprocess_output_is_collected_in_page_order() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = OutputPattern::new(dir.path(), "doc", ImageFormat::Png);
        let engine = sh_engine(
            r#"for last; do :; done; for i in 10 2 1; do : > "$(printf "$last" "$i")"; done"#,
        );

        let pages = engine
            .rasterize(
                Path::new("in.pdf"),
                &pattern,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let numbers: Vec<usize> = pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 10]);
        assert!(pages[0].path.ends_with("doc_page_001.png"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn subprocess_failure_surfaces_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = OutputPattern::new(dir.path(), "doc", ImageFormat::Png);
        let engine = sh_engine("echo 'convert: improper image header' >&2; exit 1");

        let err = engine
            .rasterize(Path::new("in.pdf"), &pattern, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "convert: improper image header");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn subprocess_without_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = OutputPattern::new(dir.path(), "doc", ImageFormat::Png);
        let engine = sh_engine("exit 0");

        let err = engine
            .rasterize(Path::new("in.pdf"), &pattern, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoOutput));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn percent_in_stem_survives_the_scene_template() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("50%d off_x1");
        std::fs::create_dir(&dir).unwrap();
        let pattern = OutputPattern::new(&dir, "50%d off", ImageFormat::Png);
        let engine = sh_engine(
            r#"for last; do :; done; for i in 1 2; do : > "$(printf "$last" "$i")"; done"#,
        );

        let pages = engine
            .rasterize(Path::new("in.pdf"), &pattern, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(pages.len(), 2);
        assert!(pages[0].path.ends_with("50%d off_page_001.png"));
        assert!(pages[1].path.ends_with("50%d off_page_002.png"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_stops_a_running_subprocess() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = OutputPattern::new(dir.path(), "doc", ImageFormat::Png);
        let engine = sh_engine("sleep 30");
        let cancel = CancellationToken::new();
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                cancel.cancel();
            });
        }

        let started = std::time::Instant::now();
        let err = engine
            .rasterize(Path::new("in.pdf"), &pattern, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Cancelled), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = OutputPattern::new(dir.path(), "doc", ImageFormat::Png);
        let engine = CommandRasterizer::new(
            "pdf2img-definitely-not-installed",
            &ConversionConfig::default(),
        );

        let err = engine
            .rasterize(Path::new("in.pdf"), &pattern, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)), "got {err:?}");
    }
}
