//! On-disk layout of one mirrored thread.
//!
//! ```text
//! <dst>/4chan/<board>/<threadId>/
//!     thread.html
//!     images/<imageId><ext>
//!     thumbs/<imageId>s.jpg
//!     css/<name><ext>
//!     js/<name><ext>
//!     assets/<static paths mirroring the remote structure>
//! ```

use std::path::{Path, PathBuf};

use crate::api::Attachment;
use crate::constants::{ARCHIVE_ROOT_DIR, THREAD_DOCUMENT_NAME};

pub const IMAGES_DIR: &str = "images";
pub const THUMBS_DIR: &str = "thumbs";
pub const CSS_DIR: &str = "css";
pub const JS_DIR: &str = "js";
pub const ASSETS_DIR: &str = "assets";

/// Where a static asset is stored, which also decides how it is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Rewritten for `url(...)` references, stored under `css/`.
    Stylesheet,
    /// Stripped of ad/analytics code, stored under `js/`.
    Script,
    /// Stored verbatim under `assets/`.
    Generic,
}

impl AssetKind {
    fn dir(self) -> &'static str {
        match self {
            AssetKind::Stylesheet => CSS_DIR,
            AssetKind::Script => JS_DIR,
            AssetKind::Generic => ASSETS_DIR,
        }
    }
}

/// Local path, relative to the thread root, of the static asset at `endpoint`.
///
/// The first segment of the remote path (`css`, `js`, `image`, ...) is
/// replaced by the local directory for `kind`; the rest is kept, minus any
/// `.`/`..`/empty segments so the result can never escape the thread root.
/// Endpoints that differ only in that first segment share a local path.
pub fn local_asset_path(endpoint: &str, kind: AssetKind) -> String {
    let segments: Vec<&str> = endpoint
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();

    let rest = if segments.len() > 1 {
        &segments[1..]
    } else {
        &segments[..]
    };

    format!("{}/{}", kind.dir(), rest.join("/"))
}

/// Fixed per-thread directory hierarchy, computed once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    root: PathBuf,
}

impl DirectoryLayout {
    /// Layout for `board`/`thread_id` under the destination directory `dst`.
    pub fn new(dst: &Path, board: &str, thread_id: u64) -> Self {
        Self {
            root: dst
                .join(ARCHIVE_ROOT_DIR)
                .join(board)
                .join(thread_id.to_string()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn document_path(&self) -> PathBuf {
        self.root.join(THREAD_DOCUMENT_NAME)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn thumbs_dir(&self) -> PathBuf {
        self.root.join(THUMBS_DIR)
    }

    pub fn css_dir(&self) -> PathBuf {
        self.root.join(CSS_DIR)
    }

    pub fn js_dir(&self) -> PathBuf {
        self.root.join(JS_DIR)
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join(ASSETS_DIR)
    }

    pub fn image_path(&self, attachment: &Attachment) -> PathBuf {
        self.images_dir().join(attachment.image_file_name())
    }

    pub fn thumbnail_path(&self, attachment: &Attachment) -> PathBuf {
        self.thumbs_dir().join(attachment.thumbnail_file_name())
    }

    /// Absolute path of a static asset.
    pub fn asset_path(&self, endpoint: &str, kind: AssetKind) -> PathBuf {
        self.root.join(local_asset_path(endpoint, kind))
    }
}
