//! Thread and post records as exposed by the JSON API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Media attached to a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Server-side image id (upload timestamp with microseconds).
    pub image_id: u64,
    /// Extension including the leading dot, e.g. `.png`.
    pub ext: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Declared base64-encoded MD5 of the full file.
    pub md5: String,
    /// Filename as it appeared on the poster's device, without extension.
    pub filename: String,
}

impl Attachment {
    /// File name of the full image, e.g. `1600000000123.png`.
    pub fn image_file_name(&self) -> String {
        format!("{}{}", self.image_id, self.ext)
    }

    /// File name of the thumbnail, e.g. `1600000000123s.jpg`.
    ///
    /// Thumbnails are always served as JPEG regardless of the original type.
    pub fn thumbnail_file_name(&self) -> String {
        format!("{}s.jpg", self.image_id)
    }
}

/// One message in a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: u64,
    pub board: String,
    pub attachment: Option<Attachment>,
}

impl Post {
    /// Whether the post carries media (declared size greater than zero).
    pub fn has_attachment(&self) -> bool {
        self.attachment.is_some()
    }
}

/// A thread snapshot. Replaced wholesale on every successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    pub board: String,
    pub id: u64,
    pub posts: Vec<Post>,
    /// Modification marker used for the next conditional fetch.
    pub last_modified: DateTime<Utc>,
    pub archived: bool,
    pub closed: bool,
}

impl Thread {
    /// Posts that carry an attachment, in thread order.
    pub fn media_posts(&self) -> impl Iterator<Item = &Post> {
        self.posts.iter().filter(|p| p.has_attachment())
    }
}

/// Wire format of `<board>/thread/<id>.json`.
#[derive(Debug, Deserialize)]
pub struct ThreadRecord {
    pub posts: Vec<PostRecord>,
}

/// Wire format of a single post. Only the fields the mirror needs.
#[derive(Debug, Deserialize)]
pub struct PostRecord {
    pub no: u64,
    #[serde(default)]
    pub tim: Option<u64>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub fsize: u64,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub archived: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub closed: bool,
}

impl ThreadRecord {
    /// Convert the wire record into a [`Thread`] for `board`/`id`.
    ///
    /// Thread-level flags come from the opening post.
    pub fn into_thread(self, board: &str, id: u64, last_modified: DateTime<Utc>) -> Thread {
        let (archived, closed) = self
            .posts
            .first()
            .map_or((false, false), |op| (op.archived, op.closed));

        let posts = self
            .posts
            .into_iter()
            .map(|p| p.into_post(board))
            .collect();

        Thread {
            board: board.to_string(),
            id,
            posts,
            last_modified,
            archived,
            closed,
        }
    }
}

impl PostRecord {
    fn into_post(self, board: &str) -> Post {
        let attachment = match (self.tim, self.ext) {
            (Some(image_id), Some(ext)) if self.fsize > 0 => Some(Attachment {
                image_id,
                ext,
                size: self.fsize,
                md5: self.md5.unwrap_or_default(),
                filename: self.filename.unwrap_or_else(|| image_id.to_string()),
            }),
            _ => None,
        };

        Post {
            id: self.no,
            board: board.to_string(),
            attachment,
        }
    }
}

/// The API encodes booleans as either `true`/`false` or `1`/`0`.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}
