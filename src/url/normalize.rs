use crate::{UrlError, UrlResult};
use url::Url;

/// Canonicalizes a URL, resolving it against `base` when one is given
///
/// # Canonicalization Steps
///
/// 1. Resolve against the base (relative references) or parse as absolute
/// 2. Reject anything that is not http or https
/// 3. Lowercase the host and drop the default port (done by the parser)
/// 4. Normalize path:
///    - Remove dot segments (. and ..)
///    - Collapse repeated slashes
///    - Remove trailing slash (except for root /)
/// 5. Remove fragment (everything after #)
/// 6. Sort query segments byte-wise, without re-encoding them
/// 7. Remove an empty query string (trailing ?)
///
/// # Arguments
///
/// * `raw` - The reference as written in markup or on the command line
/// * `base` - URL of the document the reference appeared in
///
/// # Returns
///
/// * `Ok(Url)` - Canonical URL
/// * `Err(UrlError)` - Unparseable, unsupported scheme or missing host
///
/// # Examples
///
/// ```
/// use sitegrab::url::canonicalize;
/// use url::Url;
///
/// let base = Url::parse("http://Example.com/docs/").unwrap();
/// let url = canonicalize("../about/?b=2&a=1#team", Some(&base)).unwrap();
/// assert_eq!(url.as_str(), "http://example.com/about?a=1&b=2");
/// ```
pub fn canonicalize(raw: &str, base: Option<&Url>) -> UrlResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Malformed(raw.to_string()));
    }

    let parsed = match base {
        Some(base) => base.join(trimmed),
        None => Url::parse(trimmed),
    };
    let mut url = parsed.map_err(|_| UrlError::Malformed(trimmed.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::UnsupportedScheme(url.scheme().to_string()));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingHost(trimmed.to_string())),
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    let query = url.query().and_then(sort_query);
    url.set_query(query.as_deref());

    Ok(url)
}

/// Normalizes a URL path by removing dot segments and trailing slashes
pub(crate) fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut normalized_segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                normalized_segments.pop();
            }
            _ => normalized_segments.push(segment),
        }
    }

    if normalized_segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", normalized_segments.join("/"))
}

/// Sorts `&`-separated query segments; `None` when nothing is left
fn sort_query(query: &str) -> Option<String> {
    let mut segments: Vec<&str> = query.split('&').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return None;
    }
    segments.sort_unstable();
    Some(segments.join("&"))
}
