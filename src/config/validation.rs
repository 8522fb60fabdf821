use crate::config::types::{BridgeSettings, CrawlerSettings, OutputSettings, Settings};
use crate::ConfigError;
use url::Url;

/// Validates the entire settings structure
pub fn validate(settings: &Settings) -> Result<(), ConfigError> {
    validate_crawler_settings(&settings.crawler)?;
    validate_bridge_settings(&settings.bridge)?;
    validate_output_settings(&settings.output)?;
    Ok(())
}

/// Validates crawler settings
fn validate_crawler_settings(config: &CrawlerSettings) -> Result<(), ConfigError> {
    if config.max_per_batch < 1 {
        return Err(ConfigError::Validation(format!(
            "max-per-batch must be >= 1, got {}",
            config.max_per_batch
        )));
    }

    validate_worker_name(&config.worker)?;

    if config.ready_timeout_ms > 0 && config.ready_poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "ready-poll-interval-ms must be > 0 when ready-timeout-ms is set".to_string(),
        ));
    }

    if config.min_content_bytes == 0 {
        return Err(ConfigError::Validation(
            "min-content-bytes must be > 0".to_string(),
        ));
    }

    if config.max_renderer_errors == 0 {
        return Err(ConfigError::Validation(
            "max-renderer-errors must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the worker directory name
///
/// The name becomes a single path component under each study.
fn validate_worker_name(worker: &str) -> Result<(), ConfigError> {
    if worker.is_empty() {
        return Err(ConfigError::Validation("worker cannot be empty".to_string()));
    }

    if worker == "." || worker == ".." {
        return Err(ConfigError::Validation(format!(
            "worker cannot be '{}'",
            worker
        )));
    }

    if !worker
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ConfigError::Validation(format!(
            "worker must contain only alphanumeric characters, '-', '_' or '.', got '{}'",
            worker
        )));
    }

    Ok(())
}

/// Validates bridge settings
fn validate_bridge_settings(config: &BridgeSettings) -> Result<(), ConfigError> {
    let url = Url::parse(&config.url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid bridge url '{}': {}", config.url, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Bridge url '{}' must use http or https",
            config.url
        )));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.retries == 0 {
        return Err(ConfigError::Validation("retries must be >= 1".to_string()));
    }

    Ok(())
}

/// Validates output settings
fn validate_output_settings(config: &OutputSettings) -> Result<(), ConfigError> {
    if config.base_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "base-dir cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates a root domain given on the command line
///
/// Roots are bare host names such as `example.com`; the `www.` form is
/// accepted and normalized by the caller.
pub fn validate_domain(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::Validation("Domain cannot be empty".to_string()));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::Validation(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::Validation(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}

/// Turns a command-line domain argument into a study root
///
/// Accepts `example.com`, `www.example.com` or a full URL; the result is the
/// lowercase host without `www.`.
pub fn parse_root_domain(input: &str) -> Result<String, ConfigError> {
    let mut domain = input.trim().to_lowercase();

    for scheme in ["https://", "http://"] {
        if let Some(rest) = domain.strip_prefix(scheme) {
            domain = rest.to_string();
        }
    }

    if let Some(end) = domain.find('/') {
        domain.truncate(end);
    }

    if let Some(rest) = domain.strip_prefix("www.") {
        domain = rest.to_string();
    }

    validate_domain(&domain)?;
    Ok(domain)
}
