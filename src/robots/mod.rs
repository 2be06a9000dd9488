//! Robots.txt gate
//!
//! The root's `/robots.txt` is fetched once before traversal and every
//! discovered internal URL is checked against it.

mod parser;

pub use parser::{product_token, RobotsRules};

use reqwest::Client;
use url::Url;

/// Fetches robots.txt for the site rooted at `root`
///
/// Any failure (network error, non-2xx status, unreadable body) yields
/// allow-all rules.
///
/// # Arguments
///
/// * `client` - The shared HTTP client
/// * `root` - The site root
pub async fn fetch_robots(client: &Client, root: &Url) -> RobotsRules {
    let robots_url = match root.join("/robots.txt") {
        Ok(u) => u,
        Err(_) => return RobotsRules::allow_all(),
    };

    let response = match client.get(robots_url.clone()).send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!("No robots.txt at {}: {}", robots_url, e);
            return RobotsRules::allow_all();
        }
    };

    if !response.status().is_success() {
        tracing::debug!("No robots.txt at {} ({})", robots_url, response.status());
        return RobotsRules::allow_all();
    }

    match response.text().await {
        Ok(body) => {
            tracing::info!("Loaded robots.txt from {}", robots_url);
            RobotsRules::from_content(&body)
        }
        Err(e) => {
            tracing::warn!("Failed to read robots.txt from {}: {}", robots_url, e);
            RobotsRules::allow_all()
        }
    }
}
