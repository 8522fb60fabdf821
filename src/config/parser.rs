use crate::config::types::{Settings, StudyConfig};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::Path;

/// Loads and parses a settings file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML settings file
///
/// # Returns
///
/// * `Ok(Settings)` - Successfully loaded and validated settings
/// * `Err(ConfigError)` - Failed to load, parse, or validate the settings
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use study_crawl::config::load_settings;
///
/// let settings = load_settings(Path::new("crawl.toml")).unwrap();
/// println!("Max per batch: {}", settings.crawler.max_per_batch);
/// ```
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_settings(&content)
}

/// Parses and validates settings from TOML text
pub fn parse_settings(content: &str) -> Result<Settings, ConfigError> {
    let settings: Settings = toml::from_str(content)?;
    validate(&settings)?;
    Ok(settings)
}

/// Loads a study's `config.json`
///
/// A missing file yields the default filter configuration; a present but
/// malformed file is an error.
///
/// # Arguments
///
/// * `path` - Path to `studies/<domain>/config.json`
///
/// # Returns
///
/// * `Ok(StudyConfig)` - Parsed or default configuration
/// * `Err(ConfigError)` - Unreadable file or invalid JSON
pub fn load_study_config(path: &Path) -> Result<StudyConfig, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StudyConfig::default()),
        Err(e) => return Err(e.into()),
    };

    let config: StudyConfig = serde_json::from_str(&content)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the settings file content
///
/// Logged at startup so runs with different settings can be told apart.
///
/// # Arguments
///
/// * `path` - Path to the TOML settings file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads settings and returns both the settings and their hash
pub fn load_settings_with_hash(path: &Path) -> Result<(Settings, String), ConfigError> {
    let settings = load_settings(path)?;
    let hash = compute_config_hash(path)?;
    Ok((settings, hash))
}
