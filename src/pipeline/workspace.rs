//! Job workspaces: one uniquely named temp directory per attachment.
//!
//! Layout under the temp root:
//!
//! ```text
//! {root}/{stem}_{token}/          page images
//! {root}/{stem}_{token}.pdf       downloaded document (sibling of the dir)
//! ```
//!
//! The random token comes from [`tempfile`], which creates the directory
//! atomically and retries on collision, so concurrent jobs never share a
//! workspace. [`Workspace`] is an RAII guard: dropping it (including when an
//! invocation future is cancelled mid-stage) removes both paths.

use crate::error::JobError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Longest stem kept from the attachment name, in characters.
const MAX_STEM_CHARS: usize = 96;

/// A job-scoped directory plus the companion input file path.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    dir_path: PathBuf,
    input_path: PathBuf,
    stem: String,
}

impl Workspace {
    /// Create a fresh workspace under `root` for an attachment named `attachment_name`.
    pub fn allocate(root: &Path, attachment_name: &str) -> Result<Self, JobError> {
        let stem = base_name(attachment_name);
        let dir = tempfile::Builder::new()
            .prefix(&format!("{stem}_"))
            .rand_bytes(8)
            .tempdir_in(root)
            .map_err(|e| JobError::Workspace {
                root: root.to_path_buf(),
                detail: e.to_string(),
            })?;

        let dir_path = dir.path().to_path_buf();
        let input_path = sibling_input_path(&dir_path);
        debug!(
            "Allocated workspace {} (input {})",
            dir_path.display(),
            input_path.display()
        );

        Ok(Self {
            dir: Some(dir),
            dir_path,
            input_path,
            stem,
        })
    }

    /// Directory that receives the page images.
    pub fn dir(&self) -> &Path {
        &self.dir_path
    }

    /// Where the downloaded document is written.
    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    /// Attachment name without its `.pdf` suffix, safe for use in file names.
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Remove the input file and the directory. Failures are logged, never returned.
    ///
    /// Blocks on filesystem I/O; async callers use [`Workspace::release_async`].
    pub fn release(mut self) {
        self.cleanup();
    }

    /// [`Workspace::release`] on the blocking thread pool.
    ///
    /// If the future is dropped before the task is scheduled, the workspace
    /// is still removed by `Drop` inside the task.
    pub async fn release_async(self) {
        let dir = self.dir_path.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || self.release()).await {
            warn!("Cleanup task for {} failed: {}", dir.display(), e);
        }
    }

    fn cleanup(&mut self) {
        match std::fs::remove_file(&self.input_path) {
            Ok(()) => debug!("Removed {}", self.input_path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove input file {}: {}",
                self.input_path.display(),
                e
            ),
        }

        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => debug!("Removed workspace {}", self.dir_path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(
                    "Failed to remove workspace {}: {}",
                    self.dir_path.display(),
                    e
                ),
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// `{dir}.pdf`, next to the workspace directory rather than inside it.
fn sibling_input_path(dir: &Path) -> PathBuf {
    let mut name = dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".pdf");
    dir.with_file_name(name)
}

/// Strip the `.pdf` suffix and anything that cannot appear in a file name.
pub fn base_name(attachment_name: &str) -> String {
    let trimmed = attachment_name.trim();
    let without_ext = if trimmed.to_ascii_lowercase().ends_with(".pdf") {
        &trimmed[..trimmed.len() - 4]
    } else {
        trimmed
    };

    let cleaned: String = without_ext
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_STEM_CHARS)
        .collect();

    let cleaned = cleaned.trim_matches('.').trim();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}
