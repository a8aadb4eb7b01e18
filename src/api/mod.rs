//! Remote transport: fetching thread records, pages, media and static assets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod client;
pub mod models;
pub mod rate_limiter;

pub use client::{HttpClient, Origins};
pub use models::{Attachment, Post, Thread};
pub use rate_limiter::HostRateLimiter;

/// Errors returned by a [`Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The resource does not exist (HTTP 404). For threads this means the
    /// thread was deleted or fell off the board.
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("unexpected status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound(_))
    }
}

/// Outcome of a conditional thread fetch.
#[derive(Debug, Clone)]
pub enum ThreadFetch {
    /// The thread changed since the supplied timestamp (or none was given).
    Modified(Thread),
    /// The server answered 304 Not Modified.
    NotModified,
}

/// Everything the archiving pipeline needs from the remote site.
///
/// Implementations own rate limiting and HTTP details. The conditional-GET
/// marker is passed in explicitly on every call; implementations keep no
/// per-resource timestamps of their own.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the thread record, sending `If-Modified-Since` when a timestamp
    /// is supplied.
    async fn fetch_thread(
        &self,
        board: &str,
        id: u64,
        if_modified_since: Option<DateTime<Utc>>,
    ) -> Result<ThreadFetch, TransportError>;

    /// Fetch the rendered HTML page of a thread, unconditionally.
    async fn fetch_thread_document(&self, thread: &Thread) -> Result<Vec<u8>, TransportError>;

    /// Fetch the full attachment of a post.
    async fn fetch_media(&self, post: &Post) -> Result<Vec<u8>, TransportError>;

    /// Fetch the thumbnail of a post's attachment.
    async fn fetch_thumbnail(&self, post: &Post) -> Result<Vec<u8>, TransportError>;

    /// Fetch a static asset by its endpoint path (e.g. `css/yotsuba.css`).
    async fn fetch_static_asset(&self, endpoint: &str) -> Result<Vec<u8>, TransportError>;
}
