//! Media and static-asset download tasks for one archive session.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use md5::{Digest, Md5};
use tracing::{debug, warn};

use super::barrier::CompletionBarrier;
use super::layout::{local_asset_path, AssetKind, DirectoryLayout};
use super::ledger::{DedupLedger, ResourceKey};
use super::text::{rewrite_script, rewrite_stylesheet};
use super::{sanitize_filename, ArchiveOptions, ArchiveReport};
use crate::api::{Attachment, Post, Thread, Transport, TransportError};
use crate::fs_utils::{path_exists, write_creating_dirs};
use crate::site::SiteProfile;

/// Base64-encoded MD5 of `bytes`, the format the API declares hashes in.
pub fn content_hash(bytes: &[u8]) -> String {
    STANDARD.encode(Md5::digest(bytes))
}

/// Counters accumulated by the tasks of one session.
#[derive(Debug, Default)]
pub struct SessionStats {
    media_saved: AtomicUsize,
    thumbnails_saved: AtomicUsize,
    assets_saved: AtomicUsize,
    skipped_existing: AtomicUsize,
    failures: AtomicUsize,
}

impl SessionStats {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ArchiveReport {
        ArchiveReport {
            media_saved: self.media_saved.load(Ordering::Relaxed),
            thumbnails_saved: self.thumbnails_saved.load(Ordering::Relaxed),
            assets_saved: self.assets_saved.load(Ordering::Relaxed),
            skipped_existing: self.skipped_existing.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// What a persist task counts toward when it succeeds.
#[derive(Debug, Clone, Copy)]
enum Saved {
    Media,
    Thumbnail,
    Asset,
}

/// Schedules downloads for one session.
///
/// Cheap to clone; every clone shares the session's ledger, barrier and
/// counters, so tasks spawned from inside other tasks are deduplicated and
/// awaited the same way as the ones spawned by the session itself.
#[derive(Clone)]
pub struct Downloader {
    transport: Arc<dyn Transport>,
    layout: Arc<DirectoryLayout>,
    ledger: Arc<DedupLedger>,
    barrier: CompletionBarrier,
    options: ArchiveOptions,
    site: Arc<SiteProfile>,
    stats: Arc<SessionStats>,
}

impl Downloader {
    pub fn new(
        transport: Arc<dyn Transport>,
        layout: Arc<DirectoryLayout>,
        site: Arc<SiteProfile>,
        options: ArchiveOptions,
    ) -> Self {
        Self {
            transport,
            layout,
            ledger: Arc::new(DedupLedger::new()),
            barrier: CompletionBarrier::new(),
            options,
            site,
            stats: Arc::new(SessionStats::default()),
        }
    }

    pub fn layout(&self) -> &DirectoryLayout {
        &self.layout
    }

    pub fn barrier(&self) -> &CompletionBarrier {
        &self.barrier
    }

    pub fn report(&self) -> ArchiveReport {
        self.stats.snapshot()
    }

    /// Download thumbnails and full attachments for every media post of
    /// `thread`, one post at a time. Persisting happens in separate tasks.
    pub async fn download_thread_media(&self, thread: &Thread) {
        for post in thread.media_posts() {
            if self.ledger.claim(ResourceKey::Post(post.id)) {
                self.download_post_media(post).await;
            }
        }
    }

    async fn download_post_media(&self, post: &Post) {
        let Some(attachment) = post.attachment.as_ref() else {
            return;
        };

        let thumb_path = self.layout.thumbnail_path(attachment);
        if self.should_skip(&thumb_path).await {
            debug!(post = post.id, path = %thumb_path.display(), "Thumbnail already on disk");
        } else {
            match self.transport.fetch_thumbnail(post).await {
                Ok(bytes) => self.spawn_persist(thumb_path, bytes, Saved::Thumbnail),
                Err(e) => {
                    SessionStats::bump(&self.stats.failures);
                    warn!(post = post.id, "Thumbnail download failed: {e}");
                }
            }
        }

        let image_path = self.layout.image_path(attachment);
        if self.should_skip(&image_path).await {
            debug!(post = post.id, path = %image_path.display(), "Image already on disk");
            return;
        }

        if let Some(bytes) = self.fetch_verified(post, attachment).await {
            self.spawn_persist(image_path, bytes, Saved::Media);
        }
    }

    /// Files-only mode: save each attachment under its original file name
    /// directly in the thread directory, with no thumbnails or page.
    ///
    /// A name already used by an earlier post in the thread gets the post id
    /// as a prefix, plus a counter if that is taken too.
    pub async fn download_original_files(&self, thread: &Thread) {
        for post in thread.media_posts() {
            let Some(attachment) = post.attachment.as_ref() else {
                continue;
            };
            if !self.ledger.claim(ResourceKey::Post(post.id)) {
                continue;
            }

            let name = self.claim_file_name(
                post.id,
                &sanitize_filename(&format!("{}{}", attachment.filename, attachment.ext)),
            );
            let path = self.layout.root().join(name);
            if self.should_skip(&path).await {
                debug!(post = post.id, path = %path.display(), "File already on disk");
                continue;
            }

            if let Some(bytes) = self.fetch_verified(post, attachment).await {
                self.spawn_persist(path, bytes, Saved::Media);
            }
        }
    }

    /// Claim `name` in the thread root, or the first free
    /// `<post_id>_<name>`, `<post_id>_<n>_<name>` after it.
    fn claim_file_name(&self, post_id: u64, name: &str) -> String {
        if self.ledger.claim(ResourceKey::Path(name.to_string())) {
            return name.to_string();
        }
        let mut candidate = format!("{post_id}_{name}");
        let mut n = 1usize;
        while !self.ledger.claim(ResourceKey::Path(candidate.clone())) {
            candidate = format!("{post_id}_{n}_{name}");
            n += 1;
        }
        candidate
    }

    /// Fetch a post's attachment, checking its hash when verification is on.
    ///
    /// A mismatching first attempt is retried exactly once; if the retry
    /// also fails or mismatches, nothing is returned.
    async fn fetch_verified(&self, post: &Post, attachment: &Attachment) -> Option<Vec<u8>> {
        let bytes = match self.transport.fetch_media(post).await {
            Ok(bytes) => bytes,
            Err(e) => {
                SessionStats::bump(&self.stats.failures);
                warn!(post = post.id, "Media download failed: {e}");
                return None;
            }
        };

        if !self.options.verify_md5 || content_hash(&bytes) == attachment.md5 {
            return Some(bytes);
        }

        warn!(
            post = post.id,
            expected = %attachment.md5,
            "MD5 mismatch, retrying download"
        );

        match self.transport.fetch_media(post).await {
            Ok(retry) if content_hash(&retry) == attachment.md5 => Some(retry),
            Ok(retry) => {
                SessionStats::bump(&self.stats.failures);
                warn!(
                    post = post.id,
                    expected = %attachment.md5,
                    actual = %content_hash(&retry),
                    "MD5 mismatch after retry, skipping image"
                );
                None
            }
            Err(e) => {
                SessionStats::bump(&self.stats.failures);
                warn!(post = post.id, "Media retry failed: {e}");
                None
            }
        }
    }

    /// Claim `endpoint` and, if it was not already claimed this session,
    /// download it in the background.
    ///
    /// Distinct endpoints can map to one local path (`image/x.png` and
    /// `icons/x.png` both land on `assets/x.png`); only the first of them is
    /// downloaded.
    ///
    /// Returns whether a download was scheduled.
    pub fn spawn_asset(&self, endpoint: &str, kind: AssetKind) -> bool {
        if !self.ledger.claim(ResourceKey::asset(endpoint)) {
            return false;
        }
        let local = local_asset_path(endpoint, kind);
        if !self.ledger.claim(ResourceKey::Path(local.clone())) {
            debug!(endpoint, path = %local, "Local path already claimed by another asset");
            return false;
        }

        let this = self.clone();
        let endpoint = endpoint.trim_start_matches('/').to_string();
        self.barrier.spawn(async move {
            if let Err(e) = this.download_asset(&endpoint, kind).await {
                SessionStats::bump(&this.stats.failures);
                warn!(endpoint = %endpoint, "Asset download failed: {e}");
            }
        });
        true
    }

    async fn download_asset(&self, endpoint: &str, kind: AssetKind) -> Result<(), TransportError> {
        let path = self.layout.asset_path(endpoint, kind);
        if self.should_skip(&path).await {
            debug!(endpoint, path = %path.display(), "Asset already on disk");
            return Ok(());
        }

        let bytes = self.transport.fetch_static_asset(endpoint).await?;

        let bytes = match kind {
            AssetKind::Stylesheet => {
                let css = String::from_utf8_lossy(&bytes);
                let rewritten = rewrite_stylesheet(&css, &self.site);
                for asset in &rewritten.assets {
                    self.spawn_asset(asset, AssetKind::Generic);
                }
                rewritten.text.into_bytes()
            }
            AssetKind::Script => match std::str::from_utf8(&bytes) {
                Ok(js) => rewrite_script(js, &self.site).into_bytes(),
                Err(_) => {
                    debug!(endpoint, "Script is not UTF-8, storing verbatim");
                    bytes
                }
            },
            AssetKind::Generic => bytes,
        };

        self.persist(&path, &bytes, Saved::Asset).await;
        Ok(())
    }

    /// Existing files are left alone unless overwriting was requested.
    async fn should_skip(&self, path: &Path) -> bool {
        if self.options.overwrite || !path_exists(path).await {
            return false;
        }
        SessionStats::bump(&self.stats.skipped_existing);
        true
    }

    fn spawn_persist(&self, path: PathBuf, bytes: Vec<u8>, saved: Saved) {
        let this = self.clone();
        self.barrier.spawn(async move {
            this.persist(&path, &bytes, saved).await;
        });
    }

    async fn persist(&self, path: &Path, bytes: &[u8], saved: Saved) {
        match write_creating_dirs(path, bytes).await {
            Ok(()) => SessionStats::bump(match saved {
                Saved::Media => &self.stats.media_saved,
                Saved::Thumbnail => &self.stats.thumbnails_saved,
                Saved::Asset => &self.stats.assets_saved,
            }),
            Err(e) => {
                SessionStats::bump(&self.stats.failures);
                warn!(path = %path.display(), "Failed to persist download: {e:#}");
            }
        }
    }
}
