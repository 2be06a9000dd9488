use crate::url::normalize::canonicalize;
use crate::ConfigError;
use url::Url;

/// Strips a leading `www.` from a host
///
/// `www.example.com` and `example.com` are treated as the same site.
pub fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Parses the root URL given on the command line
///
/// Accepts bare domains (`example.com`), `www.`-prefixed domains and
/// scheme-qualified URLs. Bare input is assumed to be served over `http://`.
///
/// # Arguments
///
/// * `input` - The user's root URL
///
/// # Returns
///
/// * `Ok(Url)` - The canonical root URL
/// * `Err(ConfigError::InvalidRoot)` - The input cannot be used as a crawl root
///
/// # Examples
///
/// ```
/// use sitegrab::url::parse_root;
///
/// assert_eq!(parse_root("example.com").unwrap().as_str(), "http://example.com/");
/// assert_eq!(
///     parse_root("https://www.example.com/docs/").unwrap().as_str(),
///     "https://www.example.com/docs"
/// );
/// assert!(parse_root("not a domain").is_err());
/// ```
pub fn parse_root(input: &str) -> Result<Url, ConfigError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidRoot("empty URL".to_string()));
    }

    let qualified = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        let host_part = trimmed
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default();
        if !is_plausible_host(host_part) {
            return Err(ConfigError::InvalidRoot(format!(
                "'{}' is not a domain name",
                trimmed
            )));
        }
        format!("http://{}", trimmed)
    };

    canonicalize(&qualified, None)
        .map_err(|e| ConfigError::InvalidRoot(format!("{}: {}", trimmed, e)))
}

/// Checks a bare `host[:port]` the way a user would type it
///
/// Accepts `label(.label)+` with an alphabetic TLD of at least two letters,
/// `localhost`, and IPv4 addresses.
fn is_plausible_host(host_port: &str) -> bool {
    let host = match host_port.rsplit_once(':') {
        Some((host, port)) => {
            if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
                return false;
            }
            host
        }
        None => host_port,
    };

    if host.eq_ignore_ascii_case("localhost") || host.parse::<std::net::Ipv4Addr>().is_ok() {
        return true;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    let tld_ok = labels
        .last()
        .map(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()))
        .unwrap_or(false);

    labels_ok && tld_ok
}

/// Name of the folder a site is mirrored into
///
/// The host without `www.`; an explicit port is appended as `_<port>` so
/// the name stays valid on every filesystem.
pub fn site_folder_name(root: &Url) -> String {
    let host = root.host_str().map(strip_www).unwrap_or("site");
    match root.port() {
        Some(port) => format!("{}_{}", host, port),
        None => host.to_string(),
    }
}
