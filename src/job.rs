//! Per-attachment job state.
//!
//! ```text
//! Pending ─▶ Fetching ─▶ Converting ─▶ Delivering ─▶ Done
//!    │           │            │             │
//!    └───────────┴────────────┴─────────────┴──────▶ Failed
//! ```
//!
//! Cleanup is not a state of its own: it runs when the job is released,
//! after it has reached `Done` or `Failed`.

use crate::pipeline::pages::PageImage;
use crate::pipeline::workspace::Workspace;
use crate::sink::Attachment;
use serde::Serialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Pending,
    Fetching,
    Converting,
    Delivering,
    Done,
    Failed,
}

impl JobStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStage::Done | JobStage::Failed)
    }

    /// Whether the state machine allows `self → next`.
    pub fn can_advance_to(self, next: JobStage) -> bool {
        use JobStage::*;
        match (self, next) {
            (Pending, Fetching)
            | (Fetching, Converting)
            | (Converting, Delivering)
            | (Delivering, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// User-facing progress label, for stages that do visible work.
    pub fn label(self) -> Option<&'static str> {
        match self {
            JobStage::Fetching => Some("Downloading"),
            JobStage::Converting => Some("Converting"),
            JobStage::Delivering => Some("Uploading"),
            _ => None,
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStage::Pending => "pending",
            JobStage::Fetching => "fetching",
            JobStage::Converting => "converting",
            JobStage::Delivering => "delivering",
            JobStage::Done => "done",
            JobStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One document's unit of work. Owns its workspace until released.
#[derive(Debug)]
pub struct ConversionJob {
    pub attachment: Attachment,
    pub workspace: Workspace,
    /// Rendered pages in ascending page order, filled by the converting stage.
    pub output_images: Vec<PageImage>,
    stage: JobStage,
}

impl ConversionJob {
    pub fn new(attachment: Attachment, workspace: Workspace) -> Self {
        Self {
            attachment,
            workspace,
            output_images: Vec::new(),
            stage: JobStage::Pending,
        }
    }

    pub fn stage(&self) -> JobStage {
        self.stage
    }

    pub(crate) fn advance(&mut self, next: JobStage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal job transition {} → {}",
            self.stage,
            next
        );
        debug!(
            attachment = %self.attachment.name,
            "Job {} → {}", self.stage, next
        );
        self.stage = next;
    }

    /// Remove the workspace. The job must be terminal.
    pub async fn release(self) {
        debug_assert!(self.stage.is_terminal());
        self.workspace.release_async().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        use JobStage::*;
        assert!(Pending.can_advance_to(Fetching));
        assert!(Fetching.can_advance_to(Converting));
        assert!(Converting.can_advance_to(Delivering));
        assert!(Delivering.can_advance_to(Done));
    }

    #[test]
    fn failure_from_any_non_terminal_stage() {
        use JobStage::*;
        for s in [Pending, Fetching, Converting, Delivering] {
            assert!(s.can_advance_to(Failed), "{s} → failed");
        }
        assert!(!Done.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Failed));
    }

    #[test]
    fn no_skipping_or_reentry() {
        use JobStage::*;
        assert!(!Pending.can_advance_to(Converting));
        assert!(!Converting.can_advance_to(Fetching));
        assert!(!Done.can_advance_to(Fetching));
    }

    #[test]
    fn labels() {
        assert_eq!(JobStage::Fetching.label(), Some("Downloading"));
        assert_eq!(JobStage::Delivering.label(), Some("Uploading"));
        assert_eq!(JobStage::Done.label(), None);
    }

    #[tokio::test]
    async fn release_removes_workspace() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::allocate(root.path(), "a.pdf").unwrap();
        let dir = ws.dir().to_path_buf();
        let mut job = ConversionJob::new(Attachment::new("a.pdf", "https://x/a.pdf"), ws);
        job.advance(JobStage::Failed);
        let input = job.workspace.input_path().to_path_buf();
        std::fs::write(&input, b"%PDF").unwrap();
        job.release().await;
        assert!(!dir.exists());
        assert!(!input.exists());
    }
}
