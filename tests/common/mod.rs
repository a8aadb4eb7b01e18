//! Shared test helpers: an in-memory scripted transport.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use thread_mirror::api::{Attachment, Post, Thread, ThreadFetch, Transport, TransportError};
use thread_mirror::archiver::content_hash;

/// Scripted outcome of one `fetch_thread` call.
#[derive(Debug, Clone)]
pub enum ThreadReply {
    Modified(Thread),
    NotModified,
    NotFound,
    Failure,
}

/// In-memory transport that serves canned bytes and counts every fetch.
#[derive(Default)]
pub struct FakeTransport {
    replies: Mutex<VecDeque<ThreadReply>>,
    thread_calls: Mutex<Vec<Option<DateTime<Utc>>>>,
    document: Vec<u8>,
    media: HashMap<u64, Vec<u8>>,
    media_attempts: Mutex<HashMap<u64, VecDeque<Option<Vec<u8>>>>>,
    thumbnails: HashMap<u64, Vec<u8>>,
    assets: HashMap<String, Vec<u8>>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, html: &str) -> Self {
        self.document = html.as_bytes().to_vec();
        self
    }

    pub fn with_document_bytes(mut self, bytes: &[u8]) -> Self {
        self.document = bytes.to_vec();
        self
    }

    pub fn with_media(mut self, image_id: u64, bytes: &[u8]) -> Self {
        self.media.insert(image_id, bytes.to_vec());
        self.thumbnails
            .insert(image_id, format!("thumb-{image_id}").into_bytes());
        self
    }

    /// Script successive `fetch_media` replies for `image_id`; `None` is a
    /// failed request. Once the script runs out, the `with_media` bytes are
    /// served.
    pub fn with_media_attempts(self, image_id: u64, attempts: &[Option<&[u8]>]) -> Self {
        self.media_attempts.lock().unwrap().insert(
            image_id,
            attempts.iter().copied().map(|a| a.map(<[u8]>::to_vec)).collect(),
        );
        self
    }

    pub fn without_thumbnail(mut self, image_id: u64) -> Self {
        self.thumbnails.remove(&image_id);
        self
    }

    pub fn with_asset(mut self, endpoint: &str, body: &str) -> Self {
        self.assets
            .insert(endpoint.to_string(), body.as_bytes().to_vec());
        self
    }

    pub fn with_replies(self, replies: impl IntoIterator<Item = ThreadReply>) -> Self {
        self.replies.lock().unwrap().extend(replies);
        self
    }

    pub fn push_reply(&self, reply: ThreadReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Number of fetches for `key` (`document`, `media:<id>`, `thumb:<id>`,
    /// `asset:<endpoint>`).
    pub fn fetch_count(&self, key: &str) -> usize {
        self.fetches.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    /// Total fetches whose key starts with `prefix`.
    pub fn fetch_count_prefixed(&self, prefix: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(_, n)| n)
            .sum()
    }

    /// `If-Modified-Since` values passed to `fetch_thread`, in call order.
    pub fn thread_calls(&self) -> Vec<Option<DateTime<Utc>>> {
        self.thread_calls.lock().unwrap().clone()
    }

    fn count(&self, key: String) {
        *self.fetches.lock().unwrap().entry(key).or_insert(0) += 1;
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch_thread(
        &self,
        board: &str,
        id: u64,
        if_modified_since: Option<DateTime<Utc>>,
    ) -> Result<ThreadFetch, TransportError> {
        self.thread_calls.lock().unwrap().push(if_modified_since);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ThreadReply::NotModified);

        match reply {
            ThreadReply::Modified(thread) => Ok(ThreadFetch::Modified(thread)),
            ThreadReply::NotModified => Ok(ThreadFetch::NotModified),
            ThreadReply::NotFound => Err(TransportError::NotFound(format!("{board}/{id}"))),
            ThreadReply::Failure => Err(TransportError::Status {
                status: 503,
                url: format!("{board}/{id}"),
            }),
        }
    }

    async fn fetch_thread_document(&self, _thread: &Thread) -> Result<Vec<u8>, TransportError> {
        self.count("document".to_string());
        Ok(self.document.clone())
    }

    async fn fetch_media(&self, post: &Post) -> Result<Vec<u8>, TransportError> {
        let id = image_id(post);
        self.count(format!("media:{id}"));
        let scripted = self
            .media_attempts
            .lock()
            .unwrap()
            .get_mut(&id)
            .and_then(VecDeque::pop_front);
        if let Some(reply) = scripted {
            return reply.ok_or_else(|| TransportError::Status {
                status: 503,
                url: format!("media {id}"),
            });
        }
        self.media
            .get(&id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("media {id}")))
    }

    async fn fetch_thumbnail(&self, post: &Post) -> Result<Vec<u8>, TransportError> {
        let id = image_id(post);
        self.count(format!("thumb:{id}"));
        self.thumbnails
            .get(&id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("thumbnail {id}")))
    }

    async fn fetch_static_asset(&self, endpoint: &str) -> Result<Vec<u8>, TransportError> {
        self.count(format!("asset:{endpoint}"));
        self.assets
            .get(endpoint)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(endpoint.to_string()))
    }
}

fn image_id(post: &Post) -> u64 {
    post.attachment.as_ref().map_or(0, |a| a.image_id)
}

/// A post carrying `bytes` as its attachment. With `hash_matches == false`
/// the declared MD5 never matches what the transport serves.
pub fn media_post(board: &str, id: u64, image_id: u64, bytes: &[u8], hash_matches: bool) -> Post {
    let md5 = if hash_matches {
        content_hash(bytes)
    } else {
        "AAAAAAAAAAAAAAAAAAAAAA==".to_string()
    };
    Post {
        id,
        board: board.to_string(),
        attachment: Some(Attachment {
            image_id,
            ext: ".png".to_string(),
            size: bytes.len() as u64,
            md5,
            filename: format!("upload {id}"),
        }),
    }
}

pub fn text_post(board: &str, id: u64) -> Post {
    Post {
        id,
        board: board.to_string(),
        attachment: None,
    }
}

pub fn thread(board: &str, id: u64, posts: Vec<Post>) -> Thread {
    Thread {
        board: board.to_string(),
        id,
        posts,
        last_modified: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        archived: false,
        closed: false,
    }
}
