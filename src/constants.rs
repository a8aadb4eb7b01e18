//! Shared constants used across the application.

/// User agent string sent with every request to the remote site.
pub const MIRROR_USER_AGENT: &str = concat!("thread-mirror/", env!("CARGO_PKG_VERSION"));

/// Host serving the JSON API.
pub const API_HOST: &str = "a.4cdn.org";

/// Primary host serving user-submitted media.
pub const MEDIA_HOST: &str = "i.4cdn.org";

/// Secondary media host still referenced by some rendered pages.
pub const MEDIA_HOST_ALT: &str = "is2.4chan.org";

/// Host serving icons, banners, stylesheets and scripts.
pub const STATIC_HOST: &str = "s.4cdn.org";

/// Host serving the rendered thread pages.
pub const BOARDS_HOST: &str = "boards.4chan.org";

/// Directory name inserted between the destination and the board directories.
pub const ARCHIVE_ROOT_DIR: &str = "4chan";

/// File name of the rewritten thread document.
pub const THREAD_DOCUMENT_NAME: &str = "thread.html";
