use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::api::Origins;
use crate::archiver::ArchiveOptions;
use crate::constants::{API_HOST, BOARDS_HOST, MEDIA_HOST, STATIC_HOST};
use crate::site::{SiteProfile, ThumbnailRouting};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
    #[error("failed to parse {name} as URL: {source}")]
    ParseUrl {
        name: String,
        #[source]
        source: url::ParseError,
    },
}

/// Application configuration.
///
/// Loaded from environment variables first; command line flags override
/// individual fields afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    // Output
    pub dst: PathBuf,
    pub overwrite: bool,
    pub verify_md5: bool,
    pub files_only: bool,

    // Watching
    pub poll_interval: Duration,
    pub run_once: bool,

    // Rewriting
    pub inject_banner: bool,
    pub strict_thumb_routing: bool,

    // Transport
    pub api_rate_per_sec: u32,
    pub media_rate_per_sec: u32,
    pub http_timeout_secs: u64,
    pub origins: Origins,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Output
            dst: PathBuf::from(env_or_default("MIRROR_DST", "./")),
            overwrite: parse_env_bool("MIRROR_OVERWRITE", false)?,
            verify_md5: parse_env_bool("MIRROR_VERIFY_MD5", true)?,
            files_only: parse_env_bool("MIRROR_FILES_ONLY", false)?,

            // Watching
            poll_interval: Duration::from_secs(parse_env_u64("MIRROR_POLL_INTERVAL_SECS", 300)?),
            run_once: parse_env_bool("MIRROR_RUN_ONCE", false)?,

            // Rewriting
            inject_banner: parse_env_bool("MIRROR_INJECT_BANNER", true)?,
            strict_thumb_routing: parse_env_bool("MIRROR_STRICT_THUMB_ROUTING", false)?,

            // Transport
            api_rate_per_sec: parse_env_u32("MIRROR_API_RATE_PER_SEC", 1)?,
            media_rate_per_sec: parse_env_u32("MIRROR_MEDIA_RATE_PER_SEC", 8)?,
            http_timeout_secs: parse_env_u64("MIRROR_HTTP_TIMEOUT_SECS", 30)?,
            origins: Origins {
                api: parse_env_url("MIRROR_API_BASE", &format!("https://{API_HOST}"))?,
                media: parse_env_url("MIRROR_MEDIA_BASE", &format!("https://{MEDIA_HOST}"))?,
                static_assets: parse_env_url(
                    "MIRROR_STATIC_BASE",
                    &format!("https://{STATIC_HOST}"),
                )?,
                boards: parse_env_url("MIRROR_BOARDS_BASE", &format!("https://{BOARDS_HOST}"))?,
            },
        })
    }

    /// Deterministic configuration for tests; ignores the environment.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            dst: PathBuf::from("./"),
            overwrite: false,
            verify_md5: true,
            files_only: false,
            poll_interval: Duration::from_secs(300),
            run_once: false,
            inject_banner: true,
            strict_thumb_routing: false,
            api_rate_per_sec: 1,
            media_rate_per_sec: 8,
            http_timeout_secs: 30,
            origins: Origins {
                api: default_url(API_HOST),
                media: default_url(MEDIA_HOST),
                static_assets: default_url(STATIC_HOST),
                boards: default_url(BOARDS_HOST),
            },
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "MIRROR_POLL_INTERVAL_SECS".to_string(),
                message: "must be at least 1 second".to_string(),
            });
        }
        if self.api_rate_per_sec == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MIRROR_API_RATE_PER_SEC".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.media_rate_per_sec == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MIRROR_MEDIA_RATE_PER_SEC".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MIRROR_HTTP_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Rewrite-engine profile derived from this configuration.
    pub fn site_profile(&self) -> SiteProfile {
        SiteProfile {
            thumbnail_routing: if self.strict_thumb_routing {
                ThumbnailRouting::Suffix
            } else {
                ThumbnailRouting::AnyS
            },
            inject_banner: self.inject_banner,
            ..SiteProfile::default()
        }
    }

    pub fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions {
            overwrite: self.overwrite,
            verify_md5: self.verify_md5,
        }
    }
}

fn default_url(host: &str) -> Url {
    Url::parse(&format!("https://{host}")).expect("constant host is a valid URL")
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

fn parse_env_url(name: &str, default: &str) -> Result<Url, ConfigError> {
    Url::parse(&env_or_default(name, default)).map_err(|e| ConfigError::ParseUrl {
        name: name.to_string(),
        source: e,
    })
}
