//! Pipeline stages for PDF-to-image conversion and delivery.
//!
//! Each submodule implements exactly one step, so each can be tested alone
//! and the conversion engine can be swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! workspace ──▶ fetch ──▶ rasterize ──▶ deliver
//! (temp dir)    (HTTPS)   (engine)      (reply + follow-ups)
//! ```
//!
//! 1. [`workspace`] — allocate `{stem}_{token}/` plus `{stem}_{token}.pdf`;
//!    removed on release or drop
//! 2. [`fetch`]     — stream the attachment to disk, rejecting non-2xx
//! 3. [`rasterize`] — run the engine; one image per page, named by [`pages`]
//! 4. [`deliver`]   — remainder-first batches, sent strictly in order

pub mod deliver;
pub mod fetch;
pub mod pages;
pub mod rasterize;
pub mod workspace;
