use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sitegrab::config::load_config;
///
/// let config = load_config(Path::new("sitegrab.toml")).unwrap();
/// println!("Concurrency: {}", config.crawler.concurrency);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of configuration text
///
/// Stored with each run in the event log so runs made with different
/// settings can be told apart.
pub fn compute_config_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Loads a configuration and returns both the config and its hash
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok((Config, String))` - Successfully loaded configuration and its hash
/// * `Err(ConfigError)` - Failed to load or parse the configuration
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, compute_config_hash(&content)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
cdn-allow-list = ["cdn.example.net", "*.cloudfront.net"]

[crawler]
max-depth = 3
max-pages = 50
concurrency = 8

[fetch]
max-retries = 1
user-agent = "TestMirror/1.0"

[render]
enabled = false
timeout-ms = 2000

[css]
consolidate = true

[output]
root = "./mirror"
database-path = "./crawl.db"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.max_depth, Some(3));
        assert_eq!(config.crawler.max_pages, Some(50));
        assert_eq!(config.crawler.concurrency, 8);
        assert_eq!(config.fetch.max_retries, 1);
        assert_eq!(config.fetch.user_agent, "TestMirror/1.0");
        assert!(!config.render.enabled);
        assert_eq!(config.render.timeout_ms, 2000);
        assert!(config.css.consolidate);
        assert_eq!(config.css.selector_prefix, "wg-gen");
        assert_eq!(config.output.root, "./mirror");
        assert_eq!(config.output.database_path.as_deref(), Some("./crawl.db"));
        assert_eq!(config.cdn_allow_list.len(), 2);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();

        assert_eq!(config.crawler.max_depth, None);
        assert_eq!(config.crawler.concurrency, 4);
        assert_eq!(config.fetch.max_retries, 2);
        assert!(config.render.enabled);
        assert!(!config.css.consolidate);
        assert_eq!(config.output.root, "output");
        assert!(config
            .cdn_allow_list
            .iter()
            .any(|h| h == "cdnjs.cloudflare.com"));
    }

    #[test]
    fn test_invalid_toml() {
        let result = parse_config("[crawler\nmax-depth = 3");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let result = parse_config("[crawler]\nconcurrency = 0\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_config_hash_consistency() {
        let content = "[crawler]\nconcurrency = 2\n";
        let file = create_temp_config(content);

        let (_, hash1) = load_config_with_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(content);

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_config_hash_differs() {
        assert_ne!(
            compute_config_hash("[crawler]\nconcurrency = 2\n"),
            compute_config_hash("[crawler]\nconcurrency = 3\n")
        );
    }

    #[test]
    fn test_missing_file() {
        let result = load_config(Path::new("/nonexistent/sitegrab.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
