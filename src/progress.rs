//! Progress-callback trait for per-job stage events.
//!
//! Pass a [`JobProgressCallback`] to [`crate::Pipeline::process_all`] to be
//! told whenever a job changes stage. [`crate::convert::convert_message`]
//! uses [`PendingReplyProgress`], which turns each event into an edit of the
//! pending status reply (`"[1/2] Converting slides.pdf..."`).
//!
//! Progress is a side channel. A callback that returns an error is logged
//! and otherwise ignored; it never changes a job's outcome.

use crate::error::PlatformError;
use crate::job::JobStage;
use crate::output::JobResult;
use crate::sink::DeliverySink;
use async_trait::async_trait;

/// One stage transition of one job.
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate<'a> {
    pub attachment_name: &'a str,
    /// 1-indexed position of this attachment in the invocation.
    pub position: usize,
    /// Number of attachments in the invocation.
    pub total: usize,
    /// The stage just entered.
    pub stage: JobStage,
}

impl ProgressUpdate<'_> {
    /// Status text for stages that do visible work, `None` otherwise.
    ///
    /// The `[i/n] ` counter only appears when more than one attachment is processed.
    pub fn message(&self) -> Option<String> {
        let label = self.stage.label()?;
        let counter = if self.total > 1 {
            format!("[{}/{}] ", self.position, self.total)
        } else {
            String::new()
        };
        Some(format!("{counter}{label} {}...", self.attachment_name))
    }
}

/// Called by the pipeline as jobs move through their stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
#[async_trait]
pub trait JobProgressCallback: Send + Sync {
    /// Called after every stage transition, terminal ones included.
    async fn on_stage(&self, update: ProgressUpdate<'_>) -> Result<(), PlatformError> {
        let _ = update;
        Ok(())
    }

    /// Called once per attachment after its workspace has been released.
    fn on_job_complete(&self, result: &JobResult, position: usize, total: usize) {
        let _ = (result, position, total);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Mirrors progress into the pending reply of a [`DeliverySink`].
pub struct PendingReplyProgress<'a> {
    sink: &'a dyn DeliverySink,
}

impl<'a> PendingReplyProgress<'a> {
    pub fn new(sink: &'a dyn DeliverySink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl JobProgressCallback for PendingReplyProgress<'_> {
    async fn on_stage(&self, update: ProgressUpdate<'_>) -> Result<(), PlatformError> {
        match update.message() {
            Some(text) => self.sink.edit_pending_reply(&text).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(stage: JobStage, position: usize, total: usize) -> ProgressUpdate<'static> {
        ProgressUpdate {
            attachment_name: "slides.pdf",
            position,
            total,
            stage,
        }
    }

    #[test]
    fn single_attachment_has_no_counter() {
        assert_eq!(
            update(JobStage::Fetching, 1, 1).message().as_deref(),
            Some("Downloading slides.pdf...")
        );
    }

    #[test]
    fn multiple_attachments_show_counter() {
        assert_eq!(
            update(JobStage::Converting, 2, 3).message().as_deref(),
            Some("[2/3] Converting slides.pdf...")
        );
    }

    #[test]
    fn terminal_stages_have_no_message() {
        assert!(update(JobStage::Done, 1, 1).message().is_none());
        assert!(update(JobStage::Failed, 1, 2).message().is_none());
        assert!(update(JobStage::Pending, 1, 2).message().is_none());
    }

    #[tokio::test]
    async fn noop_callback_accepts_everything() {
        let cb: &dyn JobProgressCallback = &NoopProgressCallback;
        assert!(cb.on_stage(update(JobStage::Delivering, 1, 1)).await.is_ok());
    }
}
