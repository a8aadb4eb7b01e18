//! Thread archiving pipeline: download engine, page rewrite and sessions.

use std::path::PathBuf;

use thiserror::Error;

use crate::api::TransportError;

pub mod barrier;
pub mod download;
pub mod layout;
pub mod ledger;
pub mod rewrite;
pub mod session;
pub mod text;

pub use barrier::CompletionBarrier;
pub use download::{content_hash, Downloader};
pub use layout::{local_asset_path, AssetKind, DirectoryLayout};
pub use ledger::{DedupLedger, ResourceKey};
pub use rewrite::{RewriteEngine, RewriteSummary};
pub use session::ArchiveSession;

/// Per-session download behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Re-download files that already exist on disk.
    pub overwrite: bool,
    /// Check full attachments against their declared MD5.
    pub verify_md5: bool,
}

/// What one archive session did. Individual failures are counted here and
/// logged, never propagated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub media_saved: usize,
    pub thumbnails_saved: usize,
    pub assets_saved: usize,
    pub skipped_existing: usize,
    pub failures: usize,
}

/// Failures that abort an archive session.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to fetch thread document: {0}")]
    Document(#[source] TransportError),
    #[error("thread document is not valid UTF-8: {0}")]
    Parse(#[source] std::str::Utf8Error),
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// Longest name kept from a poster-supplied file name, in bytes.
const MAX_NAME_LENGTH: usize = 200;

/// Make a poster-supplied file name safe to write into the thread directory.
///
/// Path separators and characters that are awkward in URLs or on common
/// filesystems become `_`, runs of `_` collapse, and the extension is kept.
/// A name that sanitizes to nothing becomes `file`.
///
/// # Examples
///
/// ```
/// # use thread_mirror::archiver::sanitize_filename;
/// assert_eq!(sanitize_filename("my cat #1.png"), "my_cat_1.png");
/// assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
/// ```
pub fn sanitize_filename(filename: &str) -> String {
    let (name, ext) = match filename.rfind('.') {
        Some(dot) if dot > 0 && is_extension(&filename[dot + 1..]) => filename.split_at(dot),
        _ => (filename, ""),
    };

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '(' | ')' | '[' | ']' | '-' | '_' => c,
            c if c.is_alphanumeric() => c,
            _ => '_',
        })
        .collect();

    let mut sanitized = sanitized
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    if sanitized.len() > MAX_NAME_LENGTH {
        let mut cut = MAX_NAME_LENGTH;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
    }

    if sanitized.is_empty() {
        sanitized.push_str("file");
    }

    format!("{sanitized}{ext}")
}

fn is_extension(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= 10
        && candidate.chars().all(|c| c.is_ascii_alphanumeric())
}
