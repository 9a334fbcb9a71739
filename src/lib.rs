//! # pdf2img
//!
//! Turn PDF attachments from a chat conversation into page images and post
//! them back to the same conversation.
//!
//! ## Pipeline Overview
//!
//! ```text
//! attachment (.pdf)
//!  │
//!  ├─ 1. Workspace  unique temp dir + input path per attachment
//!  ├─ 2. Fetch      stream the document over HTTPS into the workspace
//!  ├─ 3. Rasterize  pdfium (in-process) or ImageMagick (subprocess)
//!  ├─ 4. Deliver    first batch as a reply, the rest as follow-ups
//!  └─ 5. Cleanup    workspace removed whatever happened above
//! ```
//!
//! The chat platform is abstracted by [`DeliverySink`]; the conversion
//! engine by [`Rasterizer`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2img::{convert_message, Attachment, ConversionConfig, DeliverySink, Pipeline};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn on_command(
//!     sink: &dyn DeliverySink,
//!     attachments: &[Attachment],
//! ) -> Result<(), pdf2img::Pdf2ImgError> {
//!     let pipeline = Pipeline::new(ConversionConfig::default())?;
//!     let report = convert_message(&pipeline, attachments, sink, &CancellationToken::new()).await?;
//!     eprintln!("{} of {} PDFs delivered", report.succeeded(), report.results.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2img` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod sink;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, ImageFormat, RasterEngine};
pub use convert::{convert_message, select_pdf_attachments, Pipeline};
pub use error::{EngineError, FailureKind, JobError, Pdf2ImgError, PlatformError};
pub use job::{ConversionJob, JobStage};
pub use output::{DeliverySummary, InvocationReport, JobOutcome, JobResult};
pub use pipeline::deliver::{batch_sizes, Batch};
pub use pipeline::pages::{OutputPattern, PageImage};
pub use pipeline::rasterize::{CommandRasterizer, PdfiumRasterizer, Rasterizer};
pub use progress::{
    JobProgressCallback, NoopProgressCallback, PendingReplyProgress, ProgressUpdate,
};
pub use sink::{Attachment, DeliverySink};
