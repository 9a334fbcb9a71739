//! The chat-platform side of the pipeline.
//!
//! [`DeliverySink`] abstracts the conversation that triggered an invocation:
//! the message being replied to, its channel, and the pending (deferred)
//! reply that carries status text. Each invocation owns one sink; nothing
//! is shared between concurrent invocations.

use crate::error::PlatformError;
use async_trait::async_trait;
use std::path::PathBuf;

/// One attachment on the referenced message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name as shown on the platform, e.g. `"slides.pdf"`.
    pub name: String,
    /// Download URL.
    pub url: String,
    /// Size in bytes, when the platform reports it.
    pub size: Option<u64>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

/// Outbound operations against the originating conversation.
///
/// Calls for one job arrive strictly in order; an implementation never
/// sees two of them concurrently.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Reply to the referenced message with `files`.
    ///
    /// `mention_replied_user` is always `false` from this crate: replies
    /// must not ping the author of the original message.
    async fn reply_with_files(
        &self,
        files: &[PathBuf],
        mention_replied_user: bool,
    ) -> Result<(), PlatformError>;

    /// Post `files` as a follow-up message in the same conversation.
    async fn send_follow_up_with_files(&self, files: &[PathBuf]) -> Result<(), PlatformError>;

    /// Replace the text of the pending status reply.
    async fn edit_pending_reply(&self, text: &str) -> Result<(), PlatformError>;

    /// Remove the pending status reply once the files speak for themselves.
    async fn delete_pending_reply(&self) -> Result<(), PlatformError>;
}
