//! sitegrab: an offline website mirror
//!
//! This crate crawls the same-origin pages of a website, downloads the assets
//! they reference, rewrites every internal link so the copy resolves locally,
//! and can optionally move scattered inline CSS into a single stylesheet.

pub mod config;
pub mod consolidate;
pub mod crawler;
pub mod mirror;
pub mod output;
pub mod rewrite;
pub mod robots;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for mirror operations
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Rewrite error: {0}")]
    Rewrite(#[from] RewriteError),

    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::TaskState,
        to: state::TaskState,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report sink error: {0}")]
    Report(String),
}

/// Configuration-specific errors
///
/// Any of these aborts the run before traversal starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid root URL: {0}")]
    InvalidRoot(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Output directory {path} is not writable: {message}")]
    OutputNotWritable { path: String, message: String },
}

/// URL-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("Malformed URL '{0}'")]
    Malformed(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Missing host in URL '{0}'")]
    MissingHost(String),
}

/// Errors produced while fetching a resource over HTTP
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Worth retrying: timeouts, dropped connections, 408/429/5xx
    #[error("Transient error fetching {url}: {message}")]
    Transient {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// Permanent, or transient with the retry budget exhausted
    #[error("Failed to fetch {url}: {message}")]
    Failure {
        url: String,
        status: Option<u16>,
        message: String,
    },
}

impl FetchError {
    /// HTTP status attached to the failure, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } | Self::Failure { status, .. } => *status,
        }
    }
}

/// Errors produced by the headless renderer
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("Render of {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Headless browser unavailable: {0}")]
    Unavailable(String),

    #[error("Browser error: {0}")]
    Browser(String),
}

/// Errors produced while rewriting markup
#[derive(Debug, Clone, Error)]
pub enum RewriteError {
    #[error("HTML rewrite failed: {0}")]
    Html(String),
}

/// Errors produced by the mirror writer
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Refusing to write outside the mirror root: {0}")]
    Escape(String),
}

/// Result type alias for mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{mirror_site, AbortHandle, CrawlReport};
pub use state::TaskState;
pub use url::{CanonicalUrl, UrlClass, UrlScope};
