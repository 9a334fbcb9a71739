//! Error types for the pdf2img library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2ImgError`] — **Fatal**: the invocation cannot proceed at all
//!   (invalid configuration, the HTTP client cannot be built, the pending
//!   reply cannot be edited). Returned as `Err(Pdf2ImgError)` from
//!   [`crate::convert::convert_message`] and [`crate::Pipeline::new`].
//!
//! * [`JobError`] — **Per attachment**: one document failed at some stage
//!   but the remaining attachments are still processed. Stored inside
//!   [`crate::output::JobResult`] so callers can report each failure by
//!   attachment name.
//!
//! Collaborators at the edges have their own small error types:
//! [`EngineError`] for rasterizer implementations and [`PlatformError`] for
//! the chat platform. The orchestrator folds both into [`JobError`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2img library.
#[derive(Debug, Error)]
pub enum Pdf2ImgError {
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The shared HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    /// The chat platform rejected a status update that the invocation needs.
    #[error("Chat platform error: {0}")]
    Platform(#[from] PlatformError),
}

/// Coarse failure class of a [`JobError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Workspace,
    Fetch,
    Conversion,
    Delivery,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Workspace => "workspace",
            FailureKind::Fetch => "fetch",
            FailureKind::Conversion => "conversion",
            FailureKind::Delivery => "delivery",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A failure that aborts one attachment's job.
///
/// Cloneable and serialisable so it can live inside
/// [`crate::output::JobResult`] and be rendered in reports.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum JobError {
    // ── Workspace ─────────────────────────────────────────────────────────
    /// Temp directory could not be created (permissions, disk full).
    #[error("Could not allocate a workspace under '{root}': {detail}")]
    Workspace { root: PathBuf, detail: String },

    // ── Fetch ─────────────────────────────────────────────────────────────
    /// Server answered outside the 2xx range.
    #[error("Failed to download file, status code: {status}")]
    DownloadStatus { url: String, status: u16 },

    /// Connection failed, the body was cut short, or the file write failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Conversion ────────────────────────────────────────────────────────
    /// The rasterizer rejected the document. `detail` is the engine's own text.
    #[error("Could not convert '{attachment}': {detail}")]
    Conversion { attachment: String, detail: String },

    /// The rasterizer did not finish within the configured timeout.
    #[error("Converting '{attachment}' timed out after {secs}s")]
    ConversionTimeout { attachment: String, secs: u64 },

    // ── Delivery ──────────────────────────────────────────────────────────
    /// The platform rejected batch `batch` (0-based); `delivered` batches
    /// before it were already posted and stay posted.
    #[error("Sending batch {} failed after {delivered} delivered: {detail}", batch + 1)]
    Delivery {
        batch: usize,
        delivered: usize,
        detail: String,
    },

    // ── Cancellation ──────────────────────────────────────────────────────
    /// The invocation was cancelled while the job was in `stage`.
    #[error("Cancelled while {stage}")]
    Cancelled { stage: String },
}

impl JobError {
    /// The failure class this error belongs to.
    pub fn kind(&self) -> FailureKind {
        match self {
            JobError::Workspace { .. } => FailureKind::Workspace,
            JobError::DownloadStatus { .. }
            | JobError::DownloadFailed { .. }
            | JobError::DownloadTimeout { .. } => FailureKind::Fetch,
            JobError::Conversion { .. } | JobError::ConversionTimeout { .. } => {
                FailureKind::Conversion
            }
            JobError::Delivery { .. } => FailureKind::Delivery,
            JobError::Cancelled { .. } => FailureKind::Cancelled,
        }
    }
}

/// Failure reported by a [`crate::pipeline::rasterize::Rasterizer`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine itself could not be loaded or spawned.
    #[error("conversion engine unavailable: {0}")]
    Unavailable(String),

    /// The engine ran and reported a failure; the text is passed through verbatim.
    #[error("{0}")]
    Failed(String),

    /// The engine exited cleanly but wrote no page images.
    #[error("conversion engine produced no page images")]
    NoOutput,

    /// Rendering was abandoned because the invocation was cancelled.
    #[error("conversion cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error surfaced by a chat-platform collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PlatformError {
    pub message: String,
}

impl PlatformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
