/// Checks if a host matches a wildcard pattern
///
/// This function supports two types of patterns:
/// 1. Exact match: "cdn.example.com" matches only "cdn.example.com"
/// 2. Wildcard match: "*.example.com" matches "example.com" and any subdomain
///
/// Comparison is case-insensitive.
///
/// # Examples
///
/// ```
/// use sitegrab::url::matches_wildcard;
///
/// assert!(matches_wildcard("unpkg.com", "UNPKG.com"));
/// assert!(matches_wildcard("*.cloudfront.net", "d1.cloudfront.net"));
/// assert!(!matches_wildcard("*.cloudfront.net", "cloudfront.net.evil.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let candidate = candidate.to_ascii_lowercase();

    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Hosts whose resources are referenced in place rather than mirrored
#[derive(Debug, Clone, Default)]
pub struct CdnAllowList {
    patterns: Vec<String>,
}

impl CdnAllowList {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .map(|p| p.as_ref().trim().to_ascii_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// True when any pattern covers `host`
    pub fn contains(&self, host: &str) -> bool {
        self.patterns.iter().any(|p| matches_wildcard(p, host))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
