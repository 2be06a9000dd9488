//! URL handling module
//!
//! This module provides URL canonicalization, root parsing, wildcard host
//! matching and classification of links as internal, external or CDN.

mod domain;
mod matcher;
mod normalize;

use crate::{UrlError, UrlResult};
use std::fmt;
use std::hash::{Hash, Hasher};
use url::Url;

// Re-export main functions
pub use domain::{parse_root, site_folder_name, strip_www};
pub use matcher::{matches_wildcard, CdnAllowList};
pub use normalize::canonicalize;

/// A URL in canonical form
///
/// Equality and hashing use the serialized form, so two references to the
/// same resource that differ only in fragment, trailing slash, case of the
/// host or query order compare equal once canonicalized.
#[derive(Debug, Clone)]
pub struct CanonicalUrl(Url);

impl CanonicalUrl {
    /// Canonicalizes an absolute URL string
    pub fn parse(raw: &str) -> UrlResult<Self> {
        canonicalize(raw, None).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.0.query()
    }

    pub fn host_str(&self) -> Option<&str> {
        self.0.host_str()
    }
}

impl PartialEq for CanonicalUrl {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_str() == other.0.as_str()
    }
}

impl Eq for CanonicalUrl {}

impl Hash for CanonicalUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_str().hash(state);
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Where a link points, relative to the site being mirrored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlClass {
    /// Same site as the root; fetched and rewritten
    Internal,
    /// Another site; left untouched
    External,
    /// An allow-listed CDN host; left untouched
    Cdn,
}

impl UrlClass {
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal)
    }
}

/// A reference resolved against the document it appeared in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Identity of the resource
    pub url: CanonicalUrl,
    /// Absolute location to request, as written (fragment removed)
    pub location: Url,
    pub class: UrlClass,
}

/// Canonicalizes and classifies URLs for one crawl
///
/// A URL is internal when its host equals the root's host, ignoring a
/// leading `www.`, and the explicit ports agree. Internal URLs are rewritten
/// onto the root's scheme, host and port so that every spelling of the same
/// page keys identically. CDN classification takes precedence over internal.
#[derive(Debug, Clone)]
pub struct UrlScope {
    root: CanonicalUrl,
    site_host: String,
    cdn: CdnAllowList,
}

impl UrlScope {
    /// Creates a scope for the given canonical root
    ///
    /// # Arguments
    ///
    /// * `root` - The crawl root, as returned by [`parse_root`]
    /// * `cdn_patterns` - Allow-listed CDN host patterns
    pub fn new<S: AsRef<str>>(root: Url, cdn_patterns: &[S]) -> Self {
        let site_host = root
            .host_str()
            .map(|h| strip_www(h).to_string())
            .unwrap_or_default();
        Self {
            root: CanonicalUrl(root),
            site_host,
            cdn: CdnAllowList::new(cdn_patterns),
        }
    }

    pub fn root(&self) -> &CanonicalUrl {
        &self.root
    }

    /// Canonicalizes `raw` against `base` and classifies the result
    ///
    /// # Returns
    ///
    /// * `Ok(Resolved)` - Internal URLs are keyed on the root's origin
    /// * `Err(UrlError)` - The reference cannot be followed
    ///
    /// # Examples
    ///
    /// ```
    /// use sitegrab::url::{parse_root, UrlClass, UrlScope};
    ///
    /// let scope = UrlScope::new(parse_root("example.com").unwrap(), &["cdn.example.net"]);
    /// let base = scope.root().as_url().clone();
    ///
    /// let resolved = scope.resolve("https://www.example.com/about/", &base).unwrap();
    /// assert_eq!(resolved.class, UrlClass::Internal);
    /// assert_eq!(resolved.url.as_str(), "http://example.com/about");
    /// assert_eq!(resolved.location.as_str(), "https://www.example.com/about/");
    ///
    /// let resolved = scope.resolve("https://cdn.example.net/lib.js", &base).unwrap();
    /// assert_eq!(resolved.class, UrlClass::Cdn);
    /// ```
    pub fn resolve(&self, raw: &str, base: &Url) -> UrlResult<Resolved> {
        let canonical = canonicalize(raw, Some(base))?;
        let mut location = base
            .join(raw.trim())
            .map_err(|_| UrlError::Malformed(raw.to_string()))?;
        location.set_fragment(None);

        let class = self.classify(&canonical);
        let url = if class == UrlClass::Internal {
            self.onto_root_origin(canonical)
        } else {
            CanonicalUrl(canonical)
        };

        Ok(Resolved {
            url,
            location,
            class,
        })
    }

    /// Classifies an already canonical URL
    pub fn classify(&self, url: &Url) -> UrlClass {
        let host = match url.host_str() {
            Some(h) => h,
            None => return UrlClass::External,
        };

        if self.cdn.contains(host) {
            return UrlClass::Cdn;
        }

        if strip_www(host) == self.site_host && url.port() == self.root.0.port() {
            UrlClass::Internal
        } else {
            UrlClass::External
        }
    }

    fn onto_root_origin(&self, mut url: Url) -> CanonicalUrl {
        let root = &self.root.0;
        if url.scheme() != root.scheme() {
            // http <-> https never fails between special schemes
            let _ = url.set_scheme(root.scheme());
        }
        if url.host_str() != root.host_str() {
            let _ = url.set_host(root.host_str());
        }
        let _ = url.set_port(root.port());
        CanonicalUrl(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> UrlScope {
        UrlScope::new(
            parse_root("https://example.com").unwrap(),
            &["cdn.example.net", "*.cloudfront.net"],
        )
    }

    fn base() -> Url {
        Url::parse("https://example.com/docs/index").unwrap()
    }

    #[test]
    fn test_relative_link_is_internal() {
        let resolved = scope().resolve("guide#part", &base()).unwrap();
        assert_eq!(resolved.class, UrlClass::Internal);
        assert_eq!(resolved.url.as_str(), "https://example.com/docs/guide");
        assert_eq!(resolved.location.as_str(), "https://example.com/docs/guide");
    }

    #[test]
    fn test_location_keeps_trailing_slash() {
        let resolved = scope().resolve("/docs/", &base()).unwrap();
        assert_eq!(resolved.url.as_str(), "https://example.com/docs");
        assert_eq!(resolved.location.as_str(), "https://example.com/docs/");
    }

    #[test]
    fn test_www_and_scheme_are_unified() {
        let s = scope();
        let a = s.resolve("http://www.example.com/about", &base()).unwrap();
        let b = s.resolve("https://example.com/about/", &base()).unwrap();
        assert_eq!(a.url, b.url);
        assert_eq!(a.url.as_str(), "https://example.com/about");
    }

    #[test]
    fn test_subdomain_is_external() {
        let resolved = scope()
            .resolve("https://blog.example.com/post", &base())
            .unwrap();
        assert_eq!(resolved.class, UrlClass::External);
        assert_eq!(resolved.url.as_str(), "https://blog.example.com/post");
    }

    #[test]
    fn test_different_port_is_external() {
        let resolved = scope()
            .resolve("https://example.com:8443/", &base())
            .unwrap();
        assert_eq!(resolved.class, UrlClass::External);
    }

    #[test]
    fn test_cdn_classification() {
        let s = scope();
        let resolved = s.resolve("https://cdn.example.net/lib.js", &base()).unwrap();
        assert_eq!(resolved.class, UrlClass::Cdn);

        let resolved = s.resolve("//d3x.cloudfront.net/app.css", &base()).unwrap();
        assert_eq!(resolved.class, UrlClass::Cdn);
    }

    #[test]
    fn test_cdn_takes_precedence_over_internal() {
        let s = UrlScope::new(parse_root("https://example.com").unwrap(), &["example.com"]);
        let resolved = s.resolve("/about", &base()).unwrap();
        assert_eq!(resolved.class, UrlClass::Cdn);
    }

    #[test]
    fn test_canonical_equality_ignores_fragment() {
        let a = CanonicalUrl::parse("https://example.com/a#x").unwrap();
        let b = CanonicalUrl::parse("https://example.com/a/").unwrap();
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_mailto_rejected() {
        assert!(scope().resolve("mailto:a@example.com", &base()).is_err());
    }

    #[test]
    fn test_port_root_internal() {
        let s = UrlScope::new(parse_root("http://127.0.0.1:4000").unwrap(), &[] as &[&str]);
        let root = s.root().as_url().clone();
        let resolved = s.resolve("/page", &root).unwrap();
        assert_eq!(resolved.class, UrlClass::Internal);
        assert_eq!(resolved.url.as_str(), "http://127.0.0.1:4000/page");
    }
}
