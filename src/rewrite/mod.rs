//! Link rewriting for HTML and CSS
//!
//! Every reference in a fetched document is resolved against the document's
//! URL and classified. Internal references are replaced by the relative path
//! from the current output file to the target's mapped path and reported as
//! discovered links. External and CDN references, fragment-only links and
//! non-fetchable schemes are left exactly as written.
//!
//! A URL keeps the kind it was first referenced with for the whole crawl, so
//! every reference to it agrees on one output path.

mod css;
mod html;

pub use css::{rewrite_css, tokenize, CssToken};
pub use html::rewrite_html;

use crate::crawler::{expected_kind, LinkContext, ResourceKind};
use crate::mirror::{map_path, MappedPath};
use crate::url::{CanonicalUrl, UrlScope};
use crate::RewriteError;
use std::collections::HashMap;
use url::Url;

/// Schemes that never point at a fetchable resource
const INERT_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "blob:", "about:"];

/// Kinds already assigned to URLs, shared across the crawl
pub type KnownKinds = HashMap<CanonicalUrl, ResourceKind>;

/// An internal link found while rewriting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    pub url: CanonicalUrl,
    /// Absolute URL to request
    pub location: Url,
    /// Kind already known for the URL, or inferred from the first context
    /// it appeared in; decides the target's path
    pub kind: ResourceKind,
}

/// Output of a rewrite pass
#[derive(Debug, Clone)]
pub struct Rewritten {
    pub content: String,
    /// Internal links in document order, without duplicates
    pub discovered: Vec<Discovered>,
    /// References that could not be resolved, with the reason
    pub malformed: Vec<String>,
    /// Set when the document could not be rewritten and was passed through
    pub error: Option<RewriteError>,
}

/// Resolves references of one document and records what it finds
pub(crate) struct LinkCollector<'a> {
    scope: &'a UrlScope,
    known: &'a KnownKinds,
    base: Url,
    /// Output file the rewritten references are relative to
    from: MappedPath,
    discovered: Vec<Discovered>,
    /// Kinds assigned in this document
    seen: HashMap<CanonicalUrl, ResourceKind>,
    malformed: Vec<String>,
}

impl<'a> LinkCollector<'a> {
    pub(crate) fn new(scope: &'a UrlScope, known: &'a KnownKinds, base: &Url, from: &MappedPath) -> Self {
        Self {
            scope,
            known,
            base: base.clone(),
            from: from.clone(),
            discovered: Vec::new(),
            seen: HashMap::new(),
            malformed: Vec::new(),
        }
    }

    /// A collector for CSS embedded in HTML whose output lives elsewhere
    ///
    /// It starts from the kinds assigned so far; hand it back with
    /// [`LinkCollector::absorb`] before rewriting anything else.
    pub(crate) fn with_target(&self, from: &MappedPath) -> LinkCollector<'a> {
        let mut inner = LinkCollector::new(self.scope, self.known, &self.base, from);
        inner.seen = self.seen.clone();
        inner
    }

    pub(crate) fn base(&self) -> &Url {
        &self.base
    }

    /// Honors `<base href>`
    pub(crate) fn set_base(&mut self, href: &str) {
        match self.base.join(href.trim()) {
            Ok(base) => self.base = base,
            Err(e) => self.malformed.push(format!("{}: {}", href, e)),
        }
    }

    /// Returns the replacement for `raw`, or `None` to leave it untouched
    pub(crate) fn rewrite(&mut self, raw: &str, context: LinkContext) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }

        let lower = trimmed.to_ascii_lowercase();
        if INERT_SCHEMES.iter().any(|s| lower.starts_with(s)) {
            return None;
        }

        let resolved = match self.scope.resolve(trimmed, &self.base) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("Skipping reference '{}': {}", trimmed, e);
                self.malformed.push(format!("{}: {}", trimmed, e));
                return None;
            }
        };

        if !resolved.class.is_internal() {
            return None;
        }

        let kind = self
            .seen
            .get(&resolved.url)
            .or_else(|| self.known.get(&resolved.url))
            .copied()
            .unwrap_or_else(|| expected_kind(resolved.url.as_url(), context));
        let target = map_path(&resolved.url, kind);
        let mut relative = target.relative_to(&self.from);

        if let Some((_, fragment)) = trimmed.split_once('#') {
            relative.push('#');
            relative.push_str(fragment);
        }

        if !self.seen.contains_key(&resolved.url) {
            self.seen.insert(resolved.url.clone(), kind);
            self.discovered.push(Discovered {
                url: resolved.url,
                location: resolved.location,
                kind,
            });
        }

        Some(relative)
    }

    /// Appends another collector's findings, keeping first-seen order
    pub(crate) fn absorb(&mut self, other: LinkCollector<'_>) {
        for link in other.discovered {
            if !self.seen.contains_key(&link.url) {
                self.seen.insert(link.url.clone(), link.kind);
                self.discovered.push(link);
            }
        }
        self.malformed.extend(other.malformed);
    }

    pub(crate) fn finish(self, content: String, error: Option<RewriteError>) -> Rewritten {
        Rewritten {
            content,
            discovered: self.discovered,
            malformed: self.malformed,
            error,
        }
    }
}
