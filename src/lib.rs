//! Thread mirror library.
//!
//! Watches an imageboard thread and mirrors it to disk: media, thumbnails,
//! page assets, and a rewritten copy of the page that links to the local
//! files.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod api;
pub mod archiver;
pub mod cli;
pub mod config;
pub mod constants;
pub mod fs_utils;
pub mod site;
pub mod watch;
