//! Configuration types for PDF-to-image conversion and delivery.
//!
//! All pipeline behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct holds every knob so a
//! single value can be shared across concurrent invocations and logged as a
//! whole.

use crate::error::Pdf2ImgError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Hard upper bound the chat platform places on attachments per message.
pub const PLATFORM_MAX_FILES_PER_MESSAGE: usize = 10;

/// Configuration for one pipeline.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2img::{ConversionConfig, ImageFormat};
///
/// let config = ConversionConfig::builder()
///     .dpi(200)
///     .max_files_per_message(10)
///     .image_format(ImageFormat::Png)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    /// Maximum page images attached to a single outbound message. Range: 1–10. Default: 9.
    pub max_files_per_message: usize,

    /// Rasterization density in dots per inch. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Cap on either rendered dimension, in pixels. Default: 4096.
    ///
    /// Only the in-process engine honours it; a poster-sized page at 150 DPI
    /// would otherwise allocate a bitmap of several hundred megabytes.
    pub max_rendered_pixels: u32,

    /// Output image encoding. Default: [`ImageFormat::Webp`].
    pub image_format: ImageFormat,

    /// Flatten transparency onto a white background. Default: true.
    pub remove_alpha: bool,

    /// Which conversion engine rasterizes documents. Default: [`RasterEngine::Pdfium`].
    pub engine: RasterEngine,

    /// Path to libpdfium (file or containing directory).
    /// If None, `PDFIUM_LIB_PATH` is consulted, then the system library.
    pub pdfium_library_path: Option<PathBuf>,

    /// Directory under which job workspaces are created.
    /// If None, uses the platform temp directory.
    pub temp_root: Option<PathBuf>,

    /// Download timeout in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Rasterization timeout in seconds. Default: 300.
    pub conversion_timeout_secs: u64,

    /// Accept `.PDF`, `.Pdf`, … as PDF attachments. Default: false.
    pub case_insensitive_extension: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_files_per_message: 9,
            dpi: 150,
            max_rendered_pixels: 4096,
            image_format: ImageFormat::default(),
            remove_alpha: true,
            engine: RasterEngine::default(),
            pdfium_library_path: None,
            temp_root: None,
            download_timeout_secs: 120,
            conversion_timeout_secs: 300,
            case_insensitive_extension: false,
        }
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Directory under which workspaces are allocated.
    pub fn temp_root(&self) -> PathBuf {
        self.temp_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Whether an attachment with this filename should be converted.
    pub fn is_pdf_name(&self, name: &str) -> bool {
        if self.case_insensitive_extension {
            name.to_ascii_lowercase().ends_with(".pdf")
        } else {
            name.ends_with(".pdf")
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn max_files_per_message(mut self, n: usize) -> Self {
        self.config.max_files_per_message = n;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn image_format(mut self, format: ImageFormat) -> Self {
        self.config.image_format = format;
        self
    }

    pub fn remove_alpha(mut self, v: bool) -> Self {
        self.config.remove_alpha = v;
        self
    }

    pub fn engine(mut self, engine: RasterEngine) -> Self {
        self.config.engine = engine;
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn temp_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.temp_root = Some(path.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn conversion_timeout_secs(mut self, secs: u64) -> Self {
        self.config.conversion_timeout_secs = secs;
        self
    }

    pub fn case_insensitive_extension(mut self, v: bool) -> Self {
        self.config.case_insensitive_extension = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2ImgError> {
        let c = &self.config;
        if c.max_files_per_message == 0 || c.max_files_per_message > PLATFORM_MAX_FILES_PER_MESSAGE
        {
            return Err(Pdf2ImgError::InvalidConfig(format!(
                "Files per message must be 1–{}, got {}",
                PLATFORM_MAX_FILES_PER_MESSAGE, c.max_files_per_message
            )));
        }
        if c.download_timeout_secs == 0 || c.conversion_timeout_secs == 0 {
            return Err(Pdf2ImgError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if let RasterEngine::ImageMagick { ref program } = c.engine {
            if program.trim().is_empty() {
                return Err(Pdf2ImgError::InvalidConfig(
                    "ImageMagick program name is empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Encoding of the delivered page images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    /// Smaller uploads for text-heavy pages. (default)
    #[default]
    Webp,
}

impl ImageFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
        }
    }

    pub(crate) fn to_image_crate(self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Webp => image::ImageFormat::WebP,
        }
    }
}

/// The concrete conversion engine behind [`crate::pipeline::rasterize::Rasterizer`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RasterEngine {
    /// pdfium, loaded in-process. (default)
    #[default]
    Pdfium,
    /// ImageMagick run as a subprocess; `program` is `convert` or `magick`.
    ImageMagick { program: String },
}
