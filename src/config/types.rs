use serde::{Deserialize, Serialize};

/// CDN hosts whose links are preserved verbatim unless configured otherwise
pub const DEFAULT_CDN_HOSTS: &[&str] = &[
    "cdn.jsdelivr.net",
    "cdnjs.cloudflare.com",
    "unpkg.com",
    "fonts.googleapis.com",
    "ajax.googleapis.com",
];

/// Main configuration structure for a mirror run
///
/// Every section is optional in the TOML file; missing keys take the
/// defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub fetch: FetchConfig,
    pub render: RenderConfig,
    pub css: CssConfig,
    pub output: OutputConfig,

    /// Hosts (exact or `*.domain`) whose references are left untouched
    #[serde(rename = "cdn-allow-list")]
    pub cdn_allow_list: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawler: CrawlerConfig::default(),
            fetch: FetchConfig::default(),
            render: RenderConfig::default(),
            css: CssConfig::default(),
            output: OutputConfig::default(),
            cdn_allow_list: DEFAULT_CDN_HOSTS.iter().map(|h| h.to_string()).collect(),
        }
    }
}

/// Traversal behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum link depth of pages from the root; unbounded when absent
    #[serde(rename = "max-depth")]
    pub max_depth: Option<u32>,

    /// Maximum number of pages to mirror; unbounded when absent
    #[serde(rename = "max-pages")]
    pub max_pages: Option<u32>,

    /// Number of tasks in flight at once
    pub concurrency: u32,

    /// Upper bound on a single task (fetch, render and processing)
    #[serde(rename = "task-timeout-ms")]
    pub task_timeout_ms: u64,

    /// How long in-flight tasks may drain after an abort
    #[serde(rename = "abort-grace-ms")]
    pub abort_grace_ms: u64,

    /// Honor Disallow rules from the site's robots.txt
    #[serde(rename = "respect-robots")]
    pub respect_robots: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            max_pages: None,
            concurrency: 4,
            task_timeout_ms: 120_000,
            abort_grace_ms: 5_000,
            respect_robots: true,
        }
    }
}

/// HTTP fetch behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt for transient failures
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// First backoff delay; doubles with every retry
    #[serde(rename = "backoff-base-ms")]
    pub backoff_base_ms: u64,

    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 2,
            backoff_base_ms: 500,
            user_agent: format!("sitegrab/{} (+offline mirror)", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Headless rendering behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub enabled: bool,

    /// Bound on waiting for a rendered page to settle
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Maximum number of pages rendered at the same time
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: u32,

    /// Static HTML shorter than this is considered incomplete
    #[serde(rename = "min-static-bytes")]
    pub min_static_bytes: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 15_000,
            max_concurrent: 2,
            min_static_bytes: 512,
        }
    }
}

/// CSS consolidation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CssConfig {
    pub consolidate: bool,

    /// Prefix of generated class selectors
    #[serde(rename = "selector-prefix")]
    pub selector_prefix: String,
}

impl Default for CssConfig {
    fn default() -> Self {
        Self {
            consolidate: false,
            selector_prefix: "wg-gen".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory under which `<domain>/` is created
    pub root: String,

    /// Optional SQLite event log
    #[serde(rename = "database-path")]
    pub database_path: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: "output".to_string(),
            database_path: None,
        }
    }
}
