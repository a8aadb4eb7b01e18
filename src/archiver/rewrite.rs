//! DOM rewrite pass over a thread page.
//!
//! Redirects media and static-asset references to their local copies and
//! schedules downloads for newly discovered assets. Traversal is synchronous;
//! downloads run on the session's barrier and are never awaited here.

use html5ever::tendril::StrTendril;
use html5ever::{Attribute, LocalName, Namespace, QualName};
use scraper::node::Element;
use scraper::{Html, Node};
use tracing::debug;

use super::download::Downloader;
use super::layout::{local_asset_path, AssetKind, IMAGES_DIR, THUMBS_DIR};
use crate::site::SiteProfile;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Counts of what one rewrite pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    pub redirected: usize,
    pub assets_scheduled: usize,
    pub banners_injected: usize,
    pub ads_removed: usize,
}

/// A change to apply to one element, decided before mutating the tree.
#[derive(Debug, Default)]
struct Edit {
    set: Vec<(&'static str, String)>,
    append_image: Option<String>,
}

pub struct RewriteEngine<'a> {
    site: &'a SiteProfile,
    downloader: &'a Downloader,
    board: &'a str,
}

impl<'a> RewriteEngine<'a> {
    pub fn new(site: &'a SiteProfile, downloader: &'a Downloader, board: &'a str) -> Self {
        Self {
            site,
            downloader,
            board,
        }
    }

    /// Rewrite `document` in place.
    ///
    /// Elements are visited in document order. Advertisement containers are
    /// removed in a second pass once every reference has been redirected.
    pub fn rewrite(&self, document: &mut Html) -> RewriteSummary {
        let mut summary = RewriteSummary::default();

        let ids: Vec<_> = document.tree.root().descendants().map(|n| n.id()).collect();
        for id in ids {
            let edit = match document.tree.get(id).map(|n| n.value()) {
                Some(Node::Element(el)) => self.plan(el, &mut summary),
                _ => continue,
            };

            let Some(mut node) = document.tree.get_mut(id) else {
                continue;
            };
            for (name, value) in &edit.set {
                set_attr(node.value(), name, value);
                summary.redirected += 1;
            }
            if let Some(src) = edit.append_image {
                node.append(Node::Element(element("img", &[("src", &src)])));
                summary.banners_injected += 1;
            }
        }

        let ads: Vec<_> = document
            .tree
            .root()
            .descendants()
            .filter(|n| {
                n.value().as_element().is_some_and(|el| {
                    el.name() == "div"
                        && el.attr("class").is_some_and(|c| self.site.is_ad_container(c))
                })
            })
            .map(|n| n.id())
            .collect();

        for id in ads {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
                summary.ads_removed += 1;
            }
        }

        debug!(
            board = self.board,
            redirected = summary.redirected,
            assets = summary.assets_scheduled,
            ads_removed = summary.ads_removed,
            "Rewrote thread document"
        );
        summary
    }

    fn plan(&self, el: &Element, summary: &mut RewriteSummary) -> Edit {
        let mut edit = Edit::default();

        match el.name() {
            "a" => {
                if let Some(local) = el.attr("href").and_then(|v| self.media_redirect(v)) {
                    edit.set.push(("href", local));
                }
            }
            "img" => {
                if let Some(src) = el.attr("src") {
                    if let Some(local) = self.media_redirect(src) {
                        edit.set.push(("src", local));
                    } else if let Some(endpoint) = self.site.static_endpoint(src) {
                        edit.set
                            .push(("src", self.fetch_asset(endpoint, AssetKind::Generic, summary)));
                    }
                }
            }
            "link" => {
                if let Some(endpoint) = el.attr("href").and_then(|v| self.site.static_endpoint(v)) {
                    let kind = if endpoint.ends_with(".css") {
                        AssetKind::Stylesheet
                    } else {
                        AssetKind::Generic
                    };
                    edit.set.push(("href", self.fetch_asset(endpoint, kind, summary)));
                }
            }
            "script" => {
                if let Some(src) = el.attr("src") {
                    if self.site.is_ad_script(src) {
                        edit.set.push(("src", String::new()));
                    } else if let Some(endpoint) = self.site.static_endpoint(src) {
                        edit.set
                            .push(("src", self.fetch_asset(endpoint, AssetKind::Script, summary)));
                    }
                }
            }
            "div" => {
                if let Some(data_src) = el.attr("data-src").filter(|v| !v.trim().is_empty()) {
                    let endpoint = self.site.banner_endpoint(data_src);
                    let local = self.fetch_asset(&endpoint, AssetKind::Generic, summary);
                    if self.site.inject_banner {
                        edit.append_image = Some(local);
                    }
                }
            }
            _ => {}
        }

        edit
    }

    /// Local path for a media-host reference, choosing between the thumbnail
    /// and full-image directories.
    fn media_redirect(&self, value: &str) -> Option<String> {
        let fragment = self.site.media_fragment(value, self.board)?;
        let dir = if self.site.is_thumbnail_fragment(fragment) {
            THUMBS_DIR
        } else {
            IMAGES_DIR
        };
        Some(format!("{dir}/{fragment}"))
    }

    /// Schedule `endpoint` for download and return its local path. The path
    /// is returned even when the asset was already claimed.
    fn fetch_asset(&self, endpoint: &str, kind: AssetKind, summary: &mut RewriteSummary) -> String {
        if self.downloader.spawn_asset(endpoint, kind) {
            summary.assets_scheduled += 1;
        }
        local_asset_path(endpoint, kind)
    }
}

fn qual_name(local: &str, ns: &str) -> QualName {
    QualName::new(None, Namespace::from(ns), LocalName::from(local))
}

fn attribute(name: &str, value: &str) -> Attribute {
    Attribute {
        name: qual_name(name, ""),
        value: StrTendril::from(value),
    }
}

fn element(name: &str, attrs: &[(&str, &str)]) -> Element {
    Element::new(
        qual_name(name, HTML_NAMESPACE),
        attrs.iter().map(|(k, v)| attribute(k, v)).collect(),
    )
}

/// Set (or add) attribute `name` on an element node, keeping the others.
fn set_attr(node: &mut Node, name: &str, value: &str) {
    let Node::Element(el) = node else {
        return;
    };

    let mut found = false;
    let mut attrs: Vec<Attribute> = el
        .attrs()
        .map(|(k, v)| {
            if k == name {
                found = true;
                attribute(k, value)
            } else {
                attribute(k, v)
            }
        })
        .collect();
    if !found {
        attrs.push(attribute(name, value));
    }

    *el = Element::new(el.name.clone(), attrs);
}
