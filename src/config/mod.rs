//! Configuration module
//!
//! Two kinds of configuration are handled here:
//! - An optional TOML settings file for the crawler, the bridge and output paths
//! - A per-study `config.json` holding the include/exclude URL patterns
//!
//! # Example
//!
//! ```no_run
//! use study_crawl::config::load_settings;
//! use std::path::Path;
//!
//! let settings = load_settings(Path::new("crawl.toml")).unwrap();
//! println!("Domains per batch: {}", settings.crawler.max_per_batch);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BridgeSettings, CrawlerSettings, LedgerBackend, OutputSettings, Settings, StudyConfig,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_settings, load_settings_with_hash, load_study_config,
    parse_settings,
};

pub use validation::{parse_root_domain, validate, validate_domain};
