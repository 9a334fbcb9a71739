//! Result types reported back to the caller.

use crate::error::{FailureKind, JobError};
use serde::{Deserialize, Serialize};

/// What delivery sent for one successful job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeliverySummary {
    /// Page images delivered (equals the document's page count).
    pub images: usize,
    /// Messages used (reply + follow-ups).
    pub messages: usize,
}

/// Terminal outcome of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum JobOutcome {
    Success(DeliverySummary),
    Failure(JobError),
}

/// Outcome for one attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub attachment_name: String,
    pub outcome: JobOutcome,
    /// Wall-clock time for the whole job, cleanup included.
    pub duration_ms: u64,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, JobOutcome::Success(_))
    }

    pub fn error(&self) -> Option<&JobError> {
        match &self.outcome {
            JobOutcome::Failure(e) => Some(e),
            JobOutcome::Success(_) => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error().map(JobError::kind)
    }

    /// Line shown to the user when this job failed.
    pub fn failure_message(&self) -> Option<String> {
        self.error().map(|e| {
            format!(
                "An error occurred while converting the PDF {} to images: {}",
                self.attachment_name, e
            )
        })
    }
}

/// Aggregate of one invocation (one command trigger).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationReport {
    /// One entry per PDF attachment, in processing order.
    pub results: Vec<JobResult>,
    pub elapsed_ms: u64,
}

impl InvocationReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(JobResult::is_success)
    }

    /// Total images delivered across every successful job.
    pub fn images_delivered(&self) -> usize {
        self.results
            .iter()
            .filter_map(|r| match r.outcome {
                JobOutcome::Success(s) => Some(s.images),
                JobOutcome::Failure(_) => None,
            })
            .sum()
    }
}
