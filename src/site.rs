//! Site-specific knowledge used by the rewrite engine.
//!
//! Everything that ties the mirror to one particular imageboard lives here:
//! the host names that get redirected to local copies, the ad-network and
//! ad-container markers that get stripped, and the script excisions that
//! remove analytics and advertisement bootstrapping code.

use std::sync::LazyLock;

use regex::Regex;

use crate::constants::{MEDIA_HOST, MEDIA_HOST_ALT, STATIC_HOST};

static THUMBNAIL_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+s\.[A-Za-z0-9]+$").expect("Invalid regex"));

/// A literal start/end marker pair delimiting text to cut out of a script.
///
/// The cut removes everything from the start of `from` up to (but not
/// including) `until`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excision {
    pub from: String,
    pub until: String,
}

impl Excision {
    pub fn new(from: impl Into<String>, until: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            until: until.into(),
        }
    }
}

/// How anchors and images pointing at the media host pick between the
/// `thumbs/` and `images/` directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThumbnailRouting {
    /// Any `s` anywhere in the remaining path fragment means "thumbnail".
    ///
    /// This misroutes extensions such as `.gifs` or board prefixes that
    /// contain an `s`, but it is what published mirrors were built with.
    #[default]
    AnyS,
    /// Only `<digits>s.<ext>` fragments are thumbnails.
    Suffix,
}

/// Remote-site description consumed by the rewrite engine.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    /// Hosts serving post attachments and thumbnails.
    pub media_hosts: Vec<String>,
    /// Host serving stylesheets, scripts, icons and banners.
    pub static_host: String,
    /// Script sources containing any of these are blanked.
    pub ad_script_domains: Vec<String>,
    /// Div elements whose class contains any of these are removed.
    pub ad_container_classes: Vec<String>,
    /// Applied to every downloaded script, in order.
    pub script_excisions: Vec<Excision>,
    /// Endpoint prefix for banner images named by `data-src`.
    pub banner_endpoint_prefix: String,
    pub thumbnail_routing: ThumbnailRouting,
    /// Append an `<img>` for the banner, since the live page injects it from script.
    pub inject_banner: bool,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            media_hosts: vec![MEDIA_HOST.to_string(), MEDIA_HOST_ALT.to_string()],
            static_host: STATIC_HOST.to_string(),
            ad_script_domains: vec!["bid.glass".to_string()],
            ad_container_classes: vec!["adg-rects".to_string()],
            script_excisions: vec![
                Excision::new("function initAnalytics(){", "function applySearch(e){"),
                Excision::new(
                    "initAdsAG(),initAdsAT(),initAdsBG(),initAdsLD(),initAdsBGLS()",
                    "document.post&&(document.post.name.value=get_cookie(\"4chan_name\")",
                ),
                Excision::new(
                    "initAnalytics()",
                    "s=(r=location.pathname.split(/\\//))[1],window.passEnabled&&setPassMsg()",
                ),
            ],
            banner_endpoint_prefix: "image/title/".to_string(),
            thumbnail_routing: ThumbnailRouting::AnyS,
            inject_banner: true,
        }
    }
}

impl SiteProfile {
    /// Return the path fragment after `<media host>/<board>/` if `value`
    /// references one of the media hosts.
    pub fn media_fragment<'a>(&self, value: &'a str, board: &str) -> Option<&'a str> {
        self.media_hosts.iter().find_map(|host| {
            let rest = after_host(value, host)?;
            Some(
                rest.strip_prefix(board)
                    .and_then(|r| r.strip_prefix('/'))
                    .unwrap_or(rest),
            )
        })
    }

    /// Return the endpoint (path after `<static host>/`, without query or
    /// fragment) if `value` references the static host.
    pub fn static_endpoint<'a>(&self, value: &'a str) -> Option<&'a str> {
        let rest = after_host(value, &self.static_host)?;
        let end = rest.find(['?', '#']).unwrap_or(rest.len());
        let endpoint = &rest[..end];
        (!endpoint.is_empty()).then_some(endpoint)
    }

    /// Whether a script source belongs to a blocked advertising network.
    pub fn is_ad_script(&self, src: &str) -> bool {
        self.ad_script_domains.iter().any(|d| src.contains(d.as_str()))
    }

    /// Whether a container's class attribute marks it as an advertisement.
    pub fn is_ad_container(&self, class: &str) -> bool {
        self.ad_container_classes
            .iter()
            .any(|c| class.contains(c.as_str()))
    }

    /// Whether a media path fragment names a thumbnail rather than the
    /// full-size attachment.
    pub fn is_thumbnail_fragment(&self, fragment: &str) -> bool {
        match self.thumbnail_routing {
            ThumbnailRouting::AnyS => fragment.contains('s'),
            ThumbnailRouting::Suffix => THUMBNAIL_SUFFIX_RE.is_match(fragment),
        }
    }

    /// Endpoint of the banner image named by a `data-src` attribute.
    pub fn banner_endpoint(&self, data_src: &str) -> String {
        format!(
            "{}{}",
            self.banner_endpoint_prefix,
            data_src.trim_start_matches('/')
        )
    }
}

/// Text following `<host>/` in `value`, if the host occurs in it.
fn after_host<'a>(value: &'a str, host: &str) -> Option<&'a str> {
    let idx = value.find(host)?;
    value[idx + host.len()..].strip_prefix('/')
}
