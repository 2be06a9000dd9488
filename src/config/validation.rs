use crate::config::types::{Config, CrawlerConfig, CssConfig, FetchConfig, OutputConfig, RenderConfig};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_fetch_config(&config.fetch)?;
    validate_render_config(&config.render)?;
    validate_css_config(&config.css)?;
    validate_output_config(&config.output)?;
    for pattern in &config.cdn_allow_list {
        validate_domain_pattern(pattern)?;
    }
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 64, got {}",
            config.concurrency
        )));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max-pages must be >= 1 when set".to_string(),
        ));
    }

    if config.task_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "task-timeout-ms must be >= 100ms, got {}ms",
            config.task_timeout_ms
        )));
    }

    Ok(())
}

/// Validates fetch configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "fetch timeout-ms must be >= 100ms, got {}ms",
            config.timeout_ms
        )));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_render_config(config: &RenderConfig) -> Result<(), ConfigError> {
    if config.max_concurrent < 1 {
        return Err(ConfigError::Validation(format!(
            "render max-concurrent must be >= 1, got {}",
            config.max_concurrent
        )));
    }

    if config.timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "render timeout-ms must be >= 100ms, got {}ms",
            config.timeout_ms
        )));
    }

    Ok(())
}

/// Generated selectors are `.<prefix>-<page>-<n>`, so the prefix must be a
/// valid CSS identifier start
fn validate_css_config(config: &CssConfig) -> Result<(), ConfigError> {
    let prefix = &config.selector_prefix;
    let valid_start = prefix
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);

    if !valid_start
        || !prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "selector-prefix '{}' must start with a letter and contain only letters, digits, '-' or '_'",
            prefix
        )));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.root.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output root cannot be empty".to_string(),
        ));
    }

    if let Some(db) = &config.database_path {
        if db.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database-path cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    if let Some(domain) = pattern.strip_prefix("*.") {
        validate_domain_string(domain)
    } else {
        validate_domain_string(pattern)
    }
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'cdn.example.com')",
            domain
        )));
    }

    Ok(())
}
