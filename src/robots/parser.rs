//! Robots.txt rules

use robotstxt::DefaultMatcher;

/// Rules of one site's robots.txt
#[derive(Debug, Clone)]
pub struct RobotsRules {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
}

impl RobotsRules {
    /// Creates rules from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Rules that allow everything
    ///
    /// Used when robots.txt is missing, unreachable or checking is disabled.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
        }
    }

    /// Checks if a URL is allowed for the given product token
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL to check
    /// * `agent` - Product token, e.g. `sitegrab`
    ///
    /// # Returns
    ///
    /// * `true` - If the URL is allowed
    /// * `false` - If a matching group disallows it
    pub fn is_allowed(&self, url: &str, agent: &str) -> bool {
        if self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, agent, url)
    }
}

/// Product token of a User-Agent header value
///
/// `sitegrab/0.1 (+offline mirror)` → `sitegrab`
pub fn product_token(user_agent: &str) -> &str {
    user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .find(|s| !s.is_empty())
        .unwrap_or(user_agent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let robots = RobotsRules::allow_all();
        assert!(robots.is_allowed("http://e.com/any/path", "sitegrab"));
        assert!(robots.is_allowed("http://e.com/admin", "sitegrab"));
    }

    #[test]
    fn test_parse_disallow_specific() {
        let robots = RobotsRules::from_content("User-agent: *\nDisallow: /admin");
        assert!(robots.is_allowed("http://e.com/", "sitegrab"));
        assert!(robots.is_allowed("http://e.com/page", "sitegrab"));
        assert!(!robots.is_allowed("http://e.com/admin", "sitegrab"));
        assert!(!robots.is_allowed("http://e.com/admin/users", "sitegrab"));
    }

    #[test]
    fn test_parse_allow_and_disallow() {
        let robots =
            RobotsRules::from_content("User-agent: *\nDisallow: /private\nAllow: /private/public");
        assert!(!robots.is_allowed("http://e.com/private", "sitegrab"));
        assert!(robots.is_allowed("http://e.com/private/public", "sitegrab"));
    }

    #[test]
    fn test_specific_agent_group() {
        let robots =
            RobotsRules::from_content("User-agent: sitegrab\nDisallow: /\n\nUser-agent: *\nAllow: /");
        assert!(!robots.is_allowed("http://e.com/page", "sitegrab"));
        assert!(robots.is_allowed("http://e.com/page", "OtherBot"));
    }

    #[test]
    fn test_garbage_allows_everything() {
        let robots = RobotsRules::from_content("This is not valid robots.txt {{{");
        assert!(robots.is_allowed("http://e.com/any/path", "sitegrab"));
    }

    #[test]
    fn test_product_token() {
        assert_eq!(product_token("sitegrab/0.1 (+offline mirror)"), "sitegrab");
        assert_eq!(product_token("Mozilla/5.0 (X11)"), "Mozilla");
        assert_eq!(product_token("plainbot"), "plainbot");
    }
}
