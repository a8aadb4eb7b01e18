//! Command line interface.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use url::Url;

use crate::config::Config;

/// Mirror a 4chan thread, with its media and page assets, to local disk.
///
/// Examples:
///   thread-mirror po 570368
///   thread-mirror po/thread/570368
///   thread-mirror https://boards.4channel.org/po/thread/570368
#[derive(Parser, Debug)]
#[command(name = "thread-mirror", version, verbatim_doc_comment)]
pub struct Cli {
    /// Thread to mirror: `<board> <id>`, `<board>/thread/<id>` or a thread URL.
    #[arg(required = true, num_args = 1..=2, value_name = "TARGET")]
    pub target: Vec<String>,

    /// Destination directory.
    #[arg(long)]
    pub dst: Option<PathBuf>,

    /// Re-download files that already exist.
    #[arg(long)]
    pub overwrite: bool,

    /// Skip MD5 verification of downloaded attachments.
    #[arg(long = "no-verify-md5")]
    pub no_verify_md5: bool,

    /// Archive once and exit instead of watching for updates.
    #[arg(long = "run-once")]
    pub run_once: bool,

    /// Only download the attached files, not the page.
    #[arg(long = "files-only")]
    pub files_only: bool,

    /// Seconds between checks for thread updates.
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Only treat `<id>s.<ext>` media links as thumbnails.
    #[arg(long = "strict-thumb-routing")]
    pub strict_thumb_routing: bool,

    /// Do not add the banner image to the mirrored page.
    #[arg(long = "no-banner")]
    pub no_banner: bool,
}

impl Cli {
    /// Apply flags on top of a configuration loaded from the environment.
    /// Flags only ever switch behavior on; unset flags keep the env value.
    pub fn apply(&self, config: &mut Config) {
        if let Some(dst) = &self.dst {
            config.dst.clone_from(dst);
        }
        if let Some(secs) = self.interval {
            config.poll_interval = Duration::from_secs(secs);
        }
        config.overwrite |= self.overwrite;
        config.run_once |= self.run_once;
        config.files_only |= self.files_only;
        config.strict_thumb_routing |= self.strict_thumb_routing;
        if self.no_verify_md5 {
            config.verify_md5 = false;
        }
        if self.no_banner {
            config.inject_banner = false;
        }
    }

    /// Parse the positional arguments into a thread target.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments do not name a board and thread id.
    pub fn thread_target(&self) -> Result<ThreadTarget, TargetError> {
        ThreadTarget::parse(&self.target)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("expected `<board> <id>`, `<board>/thread/<id>` or a thread URL")]
    Usage,
    #[error("invalid thread URL '{0}'")]
    Url(String),
    #[error("invalid thread path '{0}', expected <board>/thread/<id>")]
    Path(String),
    #[error("invalid thread id '{0}'")]
    ThreadId(String),
}

/// Board and thread id to watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadTarget {
    pub board: String,
    pub id: u64,
}

impl ThreadTarget {
    /// Parse `["po", "570368"]`, `["po/thread/570368"]` or
    /// `["https://boards.4channel.org/po/thread/570368"]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments do not name a board and thread id.
    pub fn parse(args: &[String]) -> Result<Self, TargetError> {
        match args {
            [board, id] => Self::new(board, id),
            [single] if single.contains("://") => {
                let url = Url::parse(single).map_err(|_| TargetError::Url(single.clone()))?;
                Self::from_path(url.path()).map_err(|e| match e {
                    TargetError::Path(_) => TargetError::Url(single.clone()),
                    other => other,
                })
            }
            [single] => Self::from_path(single),
            _ => Err(TargetError::Usage),
        }
    }

    fn from_path(path: &str) -> Result<Self, TargetError> {
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        match parts.as_slice() {
            [board, "thread", id, ..] => Self::new(board, id),
            _ => Err(TargetError::Path(path.to_string())),
        }
    }

    fn new(board: &str, id: &str) -> Result<Self, TargetError> {
        let board = board.trim_matches('/');
        if board.is_empty() || !board.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TargetError::Path(board.to_string()));
        }
        let id = id
            .parse::<u64>()
            .map_err(|_| TargetError::ThreadId(id.to_string()))?;
        Ok(Self {
            board: board.to_string(),
            id,
        })
    }
}
