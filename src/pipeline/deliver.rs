//! Batching and delivery of page images.
//!
//! Batches are sized remainder-first: the first message carries
//! `((total - 1) % max) + 1` images and every later message is exactly
//! full. The reply to the original message is therefore the only one that
//! can be short, and the batch count is `ceil(total / max)`.
//!
//! Batches go out one at a time, each awaited before the next, so the
//! conversation shows pages in order. The first batch is a reply; the rest
//! are follow-ups. A rejected batch stops delivery; batches already posted
//! are not retried or withdrawn.

use crate::error::JobError;
use crate::output::DeliverySummary;
use crate::pipeline::pages::{sort_pages, PageImage};
use crate::sink::DeliverySink;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// A contiguous run of page images sent in one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 0-based position in the delivery sequence.
    pub index: usize,
    pub files: Vec<PathBuf>,
    pub is_first: bool,
}

/// Sizes of each batch for `total` images, at most `max` per message.
pub fn batch_sizes(total: usize, max: usize) -> Vec<usize> {
    if total == 0 || max == 0 {
        return Vec::new();
    }
    let first = (total - 1) % max + 1;
    let mut sizes = vec![first];
    sizes.extend(std::iter::repeat(max).take((total - first) / max));
    sizes
}

/// Split pages (already in page order) into batches.
pub fn partition(pages: &[PageImage], max: usize) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut start = 0;
    for (index, size) in batch_sizes(pages.len(), max).into_iter().enumerate() {
        batches.push(Batch {
            index,
            files: pages[start..start + size]
                .iter()
                .map(|p| p.path.clone())
                .collect(),
            is_first: index == 0,
        });
        start += size;
    }
    batches
}

/// Deliver every page to `sink` in page order.
pub async fn deliver(
    pages: &[PageImage],
    sink: &dyn DeliverySink,
    max_per_message: usize,
) -> Result<DeliverySummary, JobError> {
    let mut pages = pages.to_vec();
    sort_pages(&mut pages);
    let batches = partition(&pages, max_per_message);
    info!(
        "Sending {} images in {} messages",
        pages.len(),
        batches.len()
    );

    for batch in &batches {
        let sent = if batch.is_first {
            sink.reply_with_files(&batch.files, false).await
        } else {
            sink.send_follow_up_with_files(&batch.files).await
        };

        if let Err(e) = sent {
            warn!("Batch {} rejected: {}", batch.index + 1, e);
            return Err(JobError::Delivery {
                batch: batch.index,
                delivered: batch.index,
                detail: e.message,
            });
        }
        debug!(
            "Sent message {} with {} images",
            batch.index + 1,
            batch.files.len()
        );
    }

    Ok(DeliverySummary {
        images: pages.len(),
        messages: batches.len(),
    })
}
