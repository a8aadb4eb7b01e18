//! One archive pass over one thread snapshot.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use scraper::Html;
use tracing::{debug, info, warn};

use super::download::Downloader;
use super::layout::DirectoryLayout;
use super::rewrite::RewriteEngine;
use super::{ArchiveError, ArchiveOptions, ArchiveReport};
use crate::api::{Thread, Transport};
use crate::fs_utils::write_creating_dirs;
use crate::site::SiteProfile;

/// Handle for archiving one thread snapshot.
///
/// Every session owns a fresh ledger and barrier, so archiving the same
/// thread twice, even concurrently, never shares download state.
pub struct ArchiveSession {
    transport: Arc<dyn Transport>,
    thread: Arc<Thread>,
    site: Arc<SiteProfile>,
    downloader: Downloader,
}

impl ArchiveSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        site: Arc<SiteProfile>,
        dst: &Path,
        thread: Thread,
        options: ArchiveOptions,
    ) -> Self {
        let layout = Arc::new(DirectoryLayout::new(dst, &thread.board, thread.id));
        let downloader = Downloader::new(Arc::clone(&transport), layout, Arc::clone(&site), options);
        Self {
            transport,
            thread: Arc::new(thread),
            site,
            downloader,
        }
    }

    pub fn layout(&self) -> &DirectoryLayout {
        self.downloader.layout()
    }

    /// Mirror the thread: media, page assets and the rewritten page.
    ///
    /// Returns only after every download the session started has finished.
    ///
    /// # Errors
    ///
    /// Fails if the page cannot be fetched or decoded, or if the rewritten
    /// page cannot be written. Individual media and asset failures are
    /// logged and counted in the report instead.
    pub async fn archive(self) -> Result<ArchiveReport, ArchiveError> {
        let started = Instant::now();
        let board = self.thread.board.as_str();
        let thread_id = self.thread.id;
        info!(board, thread = thread_id, "Archiving thread");

        let document = self
            .transport
            .fetch_thread_document(&self.thread)
            .await
            .map_err(ArchiveError::Document)?;

        let media = self.downloader.clone();
        let thread = Arc::clone(&self.thread);
        self.downloader.barrier().spawn(async move {
            media.download_thread_media(&thread).await;
        });

        let result = self.write_document(&document).await;

        debug!(
            board,
            thread = thread_id,
            outstanding = self.downloader.barrier().outstanding(),
            "Waiting for downloads"
        );
        self.downloader.barrier().wait().await;

        let report = self.downloader.report();
        match &result {
            Ok(()) => info!(
                board,
                thread = thread_id,
                media = report.media_saved,
                thumbnails = report.thumbnails_saved,
                assets = report.assets_saved,
                skipped = report.skipped_existing,
                failures = report.failures,
                elapsed_ms = started.elapsed().as_millis(),
                "Thread archived"
            ),
            Err(e) => warn!(board, thread = thread_id, "Archive pass failed: {e}"),
        }

        result.map(|()| report)
    }

    /// Files-only mode: save the original attachments and nothing else.
    pub async fn archive_files_only(self) -> ArchiveReport {
        info!(
            board = %self.thread.board,
            thread = self.thread.id,
            "Downloading thread files"
        );

        self.downloader
            .download_original_files(&self.thread)
            .await;
        self.downloader.barrier().wait().await;

        let report = self.downloader.report();
        info!(
            board = %self.thread.board,
            thread = self.thread.id,
            files = report.media_saved,
            skipped = report.skipped_existing,
            failures = report.failures,
            "Thread files downloaded"
        );
        report
    }

    async fn write_document(&self, document: &[u8]) -> Result<(), ArchiveError> {
        let html = self.render(document)?;
        let path = self.layout().document_path();
        write_creating_dirs(&path, html.as_bytes())
            .await
            .map_err(|source| ArchiveError::Io { path, source })
    }

    /// Parse and rewrite the page. Runs without awaiting; downloads it
    /// schedules proceed in the background.
    fn render(&self, document: &[u8]) -> Result<String, ArchiveError> {
        let text = std::str::from_utf8(document).map_err(ArchiveError::Parse)?;
        let mut html = Html::parse_document(text);
        RewriteEngine::new(&self.site, &self.downloader, &self.thread.board).rewrite(&mut html);
        Ok(html.html())
    }
}
