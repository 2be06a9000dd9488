//! Configuration module
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every key is optional; command-line flags are applied on top in the binary.
//!
//! # Example
//!
//! ```no_run
//! use sitegrab::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sitegrab.toml")).unwrap();
//! println!("CSS consolidation: {}", config.css.consolidate);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, CssConfig, FetchConfig, OutputConfig, RenderConfig, DEFAULT_CDN_HOSTS,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
