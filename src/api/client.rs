//! HTTP implementation of [`Transport`] backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, IF_MODIFIED_SINCE, LAST_MODIFIED, USER_AGENT};
use reqwest::StatusCode;
use tracing::{debug, trace};
use url::Url;

use super::models::{Post, Thread, ThreadRecord};
use super::rate_limiter::HostRateLimiter;
use super::{ThreadFetch, Transport, TransportError};
use crate::config::Config;
use crate::constants::MIRROR_USER_AGENT;

/// Format used by `If-Modified-Since` / `Last-Modified`.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Base URLs of the four remote hosts.
#[derive(Debug, Clone)]
pub struct Origins {
    pub api: Url,
    pub media: Url,
    pub static_assets: Url,
    pub boards: Url,
}

impl Origins {
    fn join(base: &Url, path: &str) -> String {
        format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn thread_json(&self, board: &str, id: u64) -> String {
        Self::join(&self.api, &format!("{board}/thread/{id}.json"))
    }

    pub fn thread_page(&self, board: &str, id: u64) -> String {
        Self::join(&self.boards, &format!("{board}/thread/{id}"))
    }

    pub fn media(&self, board: &str, file_name: &str) -> String {
        Self::join(&self.media, &format!("{board}/{file_name}"))
    }

    pub fn static_asset(&self, endpoint: &str) -> String {
        Self::join(&self.static_assets, endpoint)
    }
}

/// Rate-limited HTTP transport.
///
/// API requests and media/static/page requests are throttled separately,
/// each per host.
#[derive(Debug)]
pub struct HttpClient {
    http: reqwest::Client,
    origins: Origins,
    api_limiter: HostRateLimiter,
    media_limiter: HostRateLimiter,
}

impl HttpClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .gzip(true)
            .build()?;

        Ok(Self {
            http,
            origins: config.origins.clone(),
            api_limiter: HostRateLimiter::new(config.api_rate_per_sec),
            media_limiter: HostRateLimiter::new(config.media_rate_per_sec),
        })
    }

    async fn get(
        &self,
        limiter: &HostRateLimiter,
        url: &str,
        if_modified_since: Option<DateTime<Utc>>,
    ) -> Result<reqwest::Response, TransportError> {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        limiter.acquire(&host).await;

        let mut request = self.http.get(url).header(USER_AGENT, MIRROR_USER_AGENT);
        if let Some(since) = if_modified_since {
            let value = since.format(HTTP_DATE_FORMAT).to_string();
            if let Ok(header) = HeaderValue::from_str(&value) {
                request = request.header(IF_MODIFIED_SINCE, header);
            }
        }

        trace!(url = %url, since = ?if_modified_since, "GET");
        let response = request.send().await.map_err(|source| TransportError::Http {
            url: url.to_string(),
            source,
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(TransportError::NotFound(url.to_string())),
            status if status.is_success() || status == StatusCode::NOT_MODIFIED => Ok(response),
            status => Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }),
        }
    }

    async fn get_bytes(
        &self,
        limiter: &HostRateLimiter,
        url: &str,
    ) -> Result<Vec<u8>, TransportError> {
        let response = self.get(limiter, url, None).await?;
        let body = response
            .bytes()
            .await
            .map_err(|source| TransportError::Http {
                url: url.to_string(),
                source,
            })?;
        debug!(url = %url, bytes = body.len(), "Fetched");
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn fetch_thread(
        &self,
        board: &str,
        id: u64,
        if_modified_since: Option<DateTime<Utc>>,
    ) -> Result<ThreadFetch, TransportError> {
        let url = self.origins.thread_json(board, id);
        let response = self.get(&self.api_limiter, &url, if_modified_since).await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(ThreadFetch::NotModified);
        }

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date)
            .unwrap_or_else(Utc::now);

        let body = response
            .bytes()
            .await
            .map_err(|source| TransportError::Http {
                url: url.clone(),
                source,
            })?;
        let record: ThreadRecord =
            serde_json::from_slice(&body).map_err(|source| TransportError::Decode {
                url: url.clone(),
                source,
            })?;

        Ok(ThreadFetch::Modified(record.into_thread(
            board,
            id,
            last_modified,
        )))
    }

    async fn fetch_thread_document(&self, thread: &Thread) -> Result<Vec<u8>, TransportError> {
        let url = self.origins.thread_page(&thread.board, thread.id);
        self.get_bytes(&self.media_limiter, &url).await
    }

    async fn fetch_media(&self, post: &Post) -> Result<Vec<u8>, TransportError> {
        let attachment = post
            .attachment
            .as_ref()
            .ok_or_else(|| TransportError::InvalidEndpoint(format!("post {} has no file", post.id)))?;
        let url = self
            .origins
            .media(&post.board, &attachment.image_file_name());
        self.get_bytes(&self.media_limiter, &url).await
    }

    async fn fetch_thumbnail(&self, post: &Post) -> Result<Vec<u8>, TransportError> {
        let attachment = post
            .attachment
            .as_ref()
            .ok_or_else(|| TransportError::InvalidEndpoint(format!("post {} has no file", post.id)))?;
        let url = self
            .origins
            .media(&post.board, &attachment.thumbnail_file_name());
        self.get_bytes(&self.media_limiter, &url).await
    }

    async fn fetch_static_asset(&self, endpoint: &str) -> Result<Vec<u8>, TransportError> {
        let endpoint = endpoint.trim_start_matches('/');
        if endpoint.is_empty() || endpoint.split('/').any(|seg| seg == "..") {
            return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
        }
        let url = self.origins.static_asset(endpoint);
        self.get_bytes(&self.media_limiter, &url).await
    }
}

/// Parse an HTTP date such as `Mon, 02 Jan 2006 15:04:05 GMT`.
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
