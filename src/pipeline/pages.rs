//! Page-image artifacts and the output naming scheme.
//!
//! Engines write `{stem}_page_{NNN}.{ext}` into the workspace. The page
//! number is carried explicitly on [`PageImage`] and ordering is always
//! numeric, never lexical: `page_10` sorts after `page_9` even when an
//! engine pads to fewer digits than the page count needs.

use crate::config::ImageFormat;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio_stream::wrappers::ReadDirStream;
use tokio_stream::StreamExt;
use tracing::debug;

static PAGE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_page_(\d+)\.[A-Za-z0-9]+$").unwrap());

/// One rendered page on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-indexed page number in the source document.
    pub page_number: usize,
    pub path: PathBuf,
}

/// Where and how an engine must name its output.
#[derive(Debug, Clone)]
pub struct OutputPattern {
    pub dir: PathBuf,
    pub stem: String,
    pub format: ImageFormat,
}

impl OutputPattern {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>, format: ImageFormat) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
            format,
        }
    }

    /// Concrete path for a 1-indexed page.
    pub fn path_for(&self, page_number: usize) -> PathBuf {
        self.dir.join(format!(
            "{}_page_{:03}.{}",
            self.stem,
            page_number,
            self.format.extension()
        ))
    }

    /// printf-style template (`%03d`) for engines that number scenes themselves.
    ///
    /// Literal `%` in the directory or stem is doubled so the engine only
    /// substitutes the page number.
    pub fn template(&self) -> PathBuf {
        escape_percent(&self.dir).join(format!(
            "{}_page_%03d.{}",
            self.stem.replace('%', "%%"),
            self.format.extension()
        ))
    }
}

fn escape_percent(path: &Path) -> PathBuf {
    path.components()
        .map(|c| match c.as_os_str().to_str() {
            Some(s) if s.contains('%') => OsString::from(s.replace('%', "%%")),
            _ => c.as_os_str().to_os_string(),
        })
        .collect()
}

/// Extract the page number from an output file name, if it carries one.
pub fn parse_page_number(file_name: &str) -> Option<usize> {
    PAGE_TOKEN
        .captures(file_name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Sort ascending by page number.
pub fn sort_pages(pages: &mut [PageImage]) {
    pages.sort_by_key(|p| p.page_number);
}

/// List every page image in `dir`, ordered by page number.
///
/// Files without a page token are ignored.
pub async fn collect_pages(dir: &Path) -> std::io::Result<Vec<PageImage>> {
    let mut entries = ReadDirStream::new(tokio::fs::read_dir(dir).await?);
    let mut pages = Vec::new();

    while let Some(entry) = entries.next().await {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        match parse_page_number(&name) {
            Some(page_number) => pages.push(PageImage {
                page_number,
                path: entry.path(),
            }),
            None => debug!("Ignoring non-page file {}", name),
        }
    }

    sort_pages(&mut pages);
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_for_pads_to_three_digits() {
        let p = OutputPattern::new("/tmp/ws", "slides", ImageFormat::Webp);
        assert_eq!(
            p.path_for(7),
            PathBuf::from("/tmp/ws/slides_page_007.webp")
        );
        assert_eq!(
            p.path_for(1234),
            PathBuf::from("/tmp/ws/slides_page_1234.webp")
        );
        assert_eq!(
            p.template(),
            PathBuf::from("/tmp/ws/slides_page_%03d.webp")
        );
    }

    #[test]
    fn template_doubles_literal_percent() {
        let p = OutputPattern::new("/tmp/100% done_ab12", "100% done", ImageFormat::Png);
        assert_eq!(
            p.template(),
            PathBuf::from("/tmp/100%% done_ab12/100%% done_page_%03d.png")
        );
        assert_eq!(
            p.path_for(2),
            PathBuf::from("/tmp/100% done_ab12/100% done_page_002.png")
        );
    }

    #[test]
    fn parse_page_numbers() {
        assert_eq!(parse_page_number("a_page_001.png"), Some(1));
        assert_eq!(parse_page_number("my_page_report_page_12.webp"), Some(12));
        assert_eq!(parse_page_number("a_page_.png"), None);
        assert_eq!(parse_page_number("a.png"), None);
    }

    #[tokio::test]
    async fn collect_sorts_numerically_not_lexically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["d_page_10.png", "d_page_2.png", "d_page_1.png", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let pages = collect_pages(dir.path()).await.unwrap();
        let numbers: Vec<usize> = pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 10]);
        assert!(pages[2].path.ends_with("d_page_10.png"));
    }

    #[tokio::test]
    async fn collect_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_pages(dir.path()).await.unwrap().is_empty());
    }
}
