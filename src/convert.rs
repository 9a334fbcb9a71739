//! Job orchestration and the command-level entry point.
//!
//! [`Pipeline`] sequences one attachment through
//! fetch → rasterize → deliver and always releases the workspace afterwards,
//! whichever stage failed. Several attachments in one invocation run one
//! after another so messages land in a predictable order; each gets its own
//! [`JobResult`] and a failure never stops the next attachment.
//!
//! A `Pipeline` holds no per-job state. Concurrent invocations can share
//! one (behind an `Arc`) and only meet in the temp directory, where every
//! workspace name carries a random token.

use crate::config::ConversionConfig;
use crate::error::{EngineError, JobError, Pdf2ImgError};
use crate::job::{ConversionJob, JobStage};
use crate::output::{DeliverySummary, InvocationReport, JobOutcome, JobResult};
use crate::pipeline::pages::{OutputPattern, PageImage};
use crate::pipeline::rasterize::{self, Rasterizer};
use crate::pipeline::workspace::Workspace;
use crate::pipeline::{deliver, fetch};
use crate::progress::{
    JobProgressCallback, NoopProgressCallback, PendingReplyProgress, ProgressUpdate,
};
use crate::sink::{Attachment, DeliverySink};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long a timed-out engine gets to acknowledge cancellation before the
/// workspace is removed underneath it.
const ENGINE_STOP_GRACE: Duration = Duration::from_secs(10);

/// Status text when the referenced message has no attachments at all.
pub const NO_FILES_MESSAGE: &str = "No files were attached.";
/// Status text when none of the attachments is a PDF.
pub const NO_PDF_MESSAGE: &str = "No PDF files were attached.";

/// The conversion pipeline: configuration, engine and HTTP client.
pub struct Pipeline {
    config: ConversionConfig,
    rasterizer: Arc<dyn Rasterizer>,
    client: reqwest::Client,
}

impl Pipeline {
    /// Build a pipeline using the engine selected in `config`.
    pub fn new(config: ConversionConfig) -> Result<Self, Pdf2ImgError> {
        let rasterizer = rasterize::from_config(&config);
        Self::with_rasterizer(config, rasterizer)
    }

    /// Build a pipeline around a caller-supplied engine.
    pub fn with_rasterizer(
        config: ConversionConfig,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Result<Self, Pdf2ImgError> {
        let client = fetch::build_client(config.download_timeout_secs)
            .map_err(|e| Pdf2ImgError::HttpClient(e.to_string()))?;
        Ok(Self {
            config,
            rasterizer,
            client,
        })
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Convert and deliver a single attachment.
    pub async fn process(
        &self,
        attachment: &Attachment,
        sink: &dyn DeliverySink,
        cancel: &CancellationToken,
    ) -> JobResult {
        self.run_job(attachment, sink, &NoopProgressCallback, 1, 1, cancel)
            .await
    }

    /// Convert and deliver each attachment in turn.
    ///
    /// Once `cancel` fires, attachments not yet started are reported as
    /// cancelled without touching the filesystem or the network.
    pub async fn process_all(
        &self,
        attachments: &[Attachment],
        sink: &dyn DeliverySink,
        progress: &dyn JobProgressCallback,
        cancel: &CancellationToken,
    ) -> Vec<JobResult> {
        let total = attachments.len();
        let mut results = Vec::with_capacity(total);

        for (i, attachment) in attachments.iter().enumerate() {
            let result = if cancel.is_cancelled() {
                JobResult {
                    attachment_name: attachment.name.clone(),
                    outcome: JobOutcome::Failure(JobError::Cancelled {
                        stage: JobStage::Pending.to_string(),
                    }),
                    duration_ms: 0,
                }
            } else {
                self.run_job(attachment, sink, progress, i + 1, total, cancel)
                    .await
            };
            progress.on_job_complete(&result, i + 1, total);
            results.push(result);
        }

        results
    }

    async fn run_job(
        &self,
        attachment: &Attachment,
        sink: &dyn DeliverySink,
        progress: &dyn JobProgressCallback,
        position: usize,
        total: usize,
        cancel: &CancellationToken,
    ) -> JobResult {
        let started = Instant::now();
        info!(
            attachment = %attachment.name,
            size = ?attachment.size,
            "Starting job {}/{}", position, total
        );

        let outcome = match Workspace::allocate(&self.config.temp_root(), &attachment.name) {
            Err(e) => {
                error!(attachment = %attachment.name, "Workspace allocation failed: {}", e);
                notify(progress, &attachment.name, position, total, JobStage::Failed).await;
                JobOutcome::Failure(e)
            }
            Ok(workspace) => {
                let mut job = ConversionJob::new(attachment.clone(), workspace);
                let result = self
                    .run_stages(&mut job, sink, progress, position, total, cancel)
                    .await;

                let (next, outcome) = match result {
                    Ok(summary) => (JobStage::Done, JobOutcome::Success(summary)),
                    Err(e) => {
                        error!(
                            attachment = %attachment.name,
                            stage = %job.stage(),
                            "Job failed: {}", e
                        );
                        (JobStage::Failed, JobOutcome::Failure(e))
                    }
                };
                job.advance(next);
                notify(progress, &attachment.name, position, total, next).await;
                job.release().await;
                outcome
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            attachment = %attachment.name,
            elapsed_ms = duration_ms,
            "Job finished: {}",
            if matches!(outcome, JobOutcome::Success(_)) { "ok" } else { "failed" }
        );

        JobResult {
            attachment_name: attachment.name.clone(),
            outcome,
            duration_ms,
        }
    }

    async fn run_stages(
        &self,
        job: &mut ConversionJob,
        sink: &dyn DeliverySink,
        progress: &dyn JobProgressCallback,
        position: usize,
        total: usize,
        cancel: &CancellationToken,
    ) -> Result<DeliverySummary, JobError> {
        // ── Step 1: Fetch ────────────────────────────────────────────────
        job.advance(JobStage::Fetching);
        notify(progress, &job.attachment.name, position, total, JobStage::Fetching).await;
        let bytes = until_cancelled(
            cancel,
            JobStage::Fetching,
            fetch::fetch(
                &self.client,
                &job.attachment.url,
                job.workspace.input_path(),
                job.attachment.size,
                self.config.download_timeout_secs,
            ),
        )
        .await?;
        debug!("Fetched {} bytes for {}", bytes, job.attachment.name);

        // ── Step 2: Rasterize ────────────────────────────────────────────
        job.advance(JobStage::Converting);
        notify(progress, &job.attachment.name, position, total, JobStage::Converting).await;
        let pattern = OutputPattern::new(
            job.workspace.dir(),
            job.workspace.stem(),
            self.config.image_format,
        );
        let pages = self
            .rasterize(&job.attachment.name, job.workspace.input_path(), &pattern, cancel)
            .await?;
        info!(
            "{} rasterized {} into {} pages",
            self.rasterizer.name(),
            job.attachment.name,
            pages.len()
        );
        job.output_images = pages;

        // ── Step 3: Deliver ──────────────────────────────────────────────
        job.advance(JobStage::Delivering);
        notify(progress, &job.attachment.name, position, total, JobStage::Delivering).await;
        until_cancelled(
            cancel,
            JobStage::Delivering,
            deliver::deliver(&job.output_images, sink, self.config.max_files_per_message),
        )
        .await
    }

    /// Run the engine under the conversion timeout.
    ///
    /// On timeout or cancellation the engine's own token is cancelled and the
    /// engine gets [`ENGINE_STOP_GRACE`] to return, so a blocking render is not
    /// still writing into the workspace when it is removed.
    async fn rasterize(
        &self,
        attachment_name: &str,
        input: &Path,
        pattern: &OutputPattern,
        cancel: &CancellationToken,
    ) -> Result<Vec<PageImage>, JobError> {
        let secs = self.config.conversion_timeout_secs;
        let engine_cancel = cancel.child_token();
        let mut engine = self.rasterizer.rasterize(input, pattern, &engine_cancel);

        let stopped = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Cancelled while {}", JobStage::Converting);
                JobError::Cancelled {
                    stage: JobStage::Converting.to_string(),
                }
            }
            _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                warn!(
                    "{} exceeded {}s on {}, stopping engine",
                    self.rasterizer.name(),
                    secs,
                    attachment_name
                );
                JobError::ConversionTimeout {
                    attachment: attachment_name.to_string(),
                    secs,
                }
            }
            result = &mut engine => {
                return result.map_err(|e| match e {
                    EngineError::Cancelled => JobError::Cancelled {
                        stage: JobStage::Converting.to_string(),
                    },
                    e => JobError::Conversion {
                        attachment: attachment_name.to_string(),
                        detail: e.to_string(),
                    },
                });
            }
        };

        engine_cancel.cancel();
        if tokio::time::timeout(ENGINE_STOP_GRACE, &mut engine)
            .await
            .is_err()
        {
            warn!(
                "{} did not stop within {}s of cancellation",
                self.rasterizer.name(),
                ENGINE_STOP_GRACE.as_secs()
            );
        }
        Err(stopped)
    }
}

/// Run one stage unless `cancel` fires first; the stage future is dropped on cancel.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    stage: JobStage,
    fut: impl Future<Output = Result<T, JobError>>,
) -> Result<T, JobError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!("Cancelled while {}", stage);
            Err(JobError::Cancelled { stage: stage.to_string() })
        }
        result = fut => result,
    }
}

async fn notify(
    progress: &dyn JobProgressCallback,
    attachment_name: &str,
    position: usize,
    total: usize,
    stage: JobStage,
) {
    let update = ProgressUpdate {
        attachment_name,
        position,
        total,
        stage,
    };
    if let Err(e) = progress.on_stage(update).await {
        warn!("Progress update for {} failed: {}", attachment_name, e);
    }
}

/// Keep only the attachments that should be converted.
pub fn select_pdf_attachments(
    config: &ConversionConfig,
    attachments: &[Attachment],
) -> Vec<Attachment> {
    attachments
        .iter()
        .filter(|a| config.is_pdf_name(&a.name))
        .cloned()
        .collect()
}

/// Handle one command trigger against the attachments of the referenced message.
///
/// Status text goes to the pending reply: a notice when there is nothing to
/// convert, stage progress while working, then either nothing (the reply is
/// deleted once every PDF was delivered) or one line per failed attachment.
///
/// # Errors
/// Only when the "nothing to convert" notice itself cannot be posted.
/// Per-attachment failures are in the returned report.
pub async fn convert_message(
    pipeline: &Pipeline,
    attachments: &[Attachment],
    sink: &dyn DeliverySink,
    cancel: &CancellationToken,
) -> Result<InvocationReport, Pdf2ImgError> {
    let started = Instant::now();

    if attachments.is_empty() {
        info!("No attachments found");
        sink.edit_pending_reply(NO_FILES_MESSAGE).await?;
        return Ok(InvocationReport::default());
    }

    let pdfs = select_pdf_attachments(pipeline.config(), attachments);
    if pdfs.is_empty() {
        info!("No PDF attachments among {}", attachments.len());
        sink.edit_pending_reply(NO_PDF_MESSAGE).await?;
        return Ok(InvocationReport::default());
    }

    info!("Processing {} PDF(s)", pdfs.len());
    let progress = PendingReplyProgress::new(sink);
    let results = pipeline.process_all(&pdfs, sink, &progress, cancel).await;

    let report = InvocationReport {
        results,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };

    if report.all_succeeded() {
        if let Err(e) = sink.delete_pending_reply().await {
            warn!("Failed to clear status reply: {}", e);
        }
    } else {
        let text = report
            .results
            .iter()
            .filter_map(JobResult::failure_message)
            .collect::<Vec<_>>()
            .join("\n");
        if let Err(e) = sink.edit_pending_reply(&text).await {
            warn!("Failed to post failure summary: {}", e);
        }
    }

    info!(
        "Invocation finished: {}/{} PDFs delivered in {}ms",
        report.succeeded(),
        report.results.len(),
        report.elapsed_ms
    );
    Ok(report)
}
