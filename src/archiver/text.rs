//! Text transforms applied to downloaded stylesheets and scripts.

use super::layout::{local_asset_path, AssetKind, ASSETS_DIR};
use crate::site::{Excision, SiteProfile};

/// Stylesheets live in `css/`, so asset references climb one level.
const STYLESHEET_ASSET_PREFIX: &str = "../";

/// A stylesheet with its `url(...)` references redirected to local copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetRewrite {
    pub text: String,
    /// Endpoints of the referenced assets, in first-seen order, deduplicated.
    pub assets: Vec<String>,
}

/// Find every `url(...)` reference to the static host (or a root-relative
/// path on it) and rewrite it to the local asset path.
///
/// Each discovered reference string is replaced everywhere in the text,
/// longest first so that a shorter reference never clobbers part of a longer
/// one. A final cleanup collapses any stray slash left in front of the local
/// prefix.
pub fn rewrite_stylesheet(css: &str, site: &SiteProfile) -> StylesheetRewrite {
    let mut references: Vec<(String, String)> = Vec::new();

    for reference in url_references(css) {
        let Some(endpoint) = stylesheet_endpoint(reference, site) else {
            continue;
        };
        if references.iter().any(|(r, _)| r == reference) {
            continue;
        }
        references.push((reference.to_string(), endpoint));
    }

    let mut assets: Vec<String> = Vec::new();
    for (_, endpoint) in &references {
        if !assets.contains(endpoint) {
            assets.push(endpoint.clone());
        }
    }

    let mut ordered = references;
    ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut text = css.to_string();
    for (reference, endpoint) in &ordered {
        let local = format!(
            "{STYLESHEET_ASSET_PREFIX}{}",
            local_asset_path(endpoint, AssetKind::Generic)
        );
        text = text.replace(reference.as_str(), &local);
    }

    let local_root = format!("{STYLESHEET_ASSET_PREFIX}{ASSETS_DIR}/");
    let text = text.replace(&format!("/{local_root}"), &local_root);

    StylesheetRewrite { text, assets }
}

/// Contents of every `url(...)` in `css`, trimmed of whitespace and quotes.
fn url_references(css: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = css;

    while let Some(start) = rest.find("url(") {
        let after = &rest[start + 4..];
        let Some(end) = after.find(')') else {
            break;
        };
        let reference = after[..end]
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .trim();
        if !reference.is_empty() {
            found.push(reference);
        }
        rest = &after[end + 1..];
    }

    found
}

/// Endpoint for a stylesheet reference, if it points at the static host.
///
/// Root-relative references (`/image/x.png`) are resolved against the static
/// host since that is where the stylesheet itself was served from.
fn stylesheet_endpoint(reference: &str, site: &SiteProfile) -> Option<String> {
    if let Some(endpoint) = site.static_endpoint(reference) {
        return Some(endpoint.to_string());
    }

    if reference.starts_with('/') && !reference.starts_with("//") {
        let path = reference.trim_start_matches('/');
        let end = path.find(['?', '#']).unwrap_or(path.len());
        let endpoint = &path[..end];
        return (!endpoint.is_empty()).then(|| endpoint.to_string());
    }

    None
}

/// Remove the text delimited by `excision`, if both markers are present.
///
/// Everything from the start marker up to (not including) the first end
/// marker that follows it is dropped.
pub fn excise(text: &str, excision: &Excision) -> Option<String> {
    let from = text.find(excision.from.as_str())?;
    let until = from + text[from..].find(excision.until.as_str())?;
    Some(format!("{}{}", &text[..from], &text[until..]))
}

/// Strip ad/analytics code from a script and point static-host references
/// at the local asset directory.
pub fn rewrite_script(js: &str, site: &SiteProfile) -> String {
    let mut text = js.to_string();

    for excision in &site.script_excisions {
        if let Some(cut) = excise(&text, excision) {
            text = cut;
        }
    }

    let local_prefix = format!("{ASSETS_DIR}/");
    for origin in [
        format!("https://{}/", site.static_host),
        format!("http://{}/", site.static_host),
        format!("//{}/", site.static_host),
    ] {
        text = text.replace(&origin, &local_prefix);
    }

    text
}
