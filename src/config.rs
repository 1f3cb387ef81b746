//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/commitfeed.sqlite"
//!
//! [github]
//! query = "fix typo"
//! per_page = 100
//!
//! [ingest]
//! concurrency = 4
//! max_reported_errors = 5
//!
//! [server]
//! bind = "127.0.0.1:7340"
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Only `[db]` is required; every other section falls back to defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Remote commit-search API settings.
#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Commit search query, e.g. `"fix typo"`.
    #[serde(default = "default_query")]
    pub query: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            query: default_query(),
            per_page: default_per_page(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_query() -> String {
    "fix typo".to_string()
}
fn default_per_page() -> u32 {
    100
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_user_agent() -> String {
    format!("commitfeed/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Name of the seeded source row that ingested entities point at.
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_reported_errors")]
    pub max_reported_errors: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            concurrency: default_concurrency(),
            max_reported_errors: default_max_reported_errors(),
        }
    }
}

fn default_source() -> String {
    "github".to_string()
}
fn default_concurrency() -> usize {
    4
}
fn default_max_reported_errors() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "warn".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.github.query.trim().is_empty() {
        anyhow::bail!("github.query must not be empty");
    }

    if !(1..=100).contains(&config.github.per_page) {
        anyhow::bail!("github.per_page must be in [1, 100]");
    }

    if !config.github.api_url.starts_with("http://") && !config.github.api_url.starts_with("https://")
    {
        anyhow::bail!(
            "github.api_url must be an http(s) URL, got '{}'",
            config.github.api_url
        );
    }

    if config.ingest.concurrency == 0 {
        anyhow::bail!("ingest.concurrency must be >= 1");
    }

    if config.ingest.source.trim().is_empty() {
        anyhow::bail!("ingest.source must not be empty");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse_config("[db]\npath = \"./data/cf.sqlite\"\n").unwrap();
        assert_eq!(cfg.db.path, PathBuf::from("./data/cf.sqlite"));
        assert_eq!(cfg.github.api_url, "https://api.github.com");
        assert_eq!(cfg.github.per_page, 100);
        assert_eq!(cfg.ingest.source, "github");
        assert_eq!(cfg.ingest.concurrency, 4);
        assert_eq!(cfg.ingest.max_reported_errors, 5);
        assert_eq!(cfg.server.bind, "127.0.0.1:7340");
        assert_eq!(cfg.logging.level, "warn");
    }

    #[test]
    fn test_missing_db_section_fails() {
        assert!(parse_config("[github]\nquery = \"x\"\n").is_err());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = parse_config("[db]\npath = \"x\"\n[ingest]\nconcurrency = 0\n").unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_rejects_oversized_page() {
        let err = parse_config("[db]\npath = \"x\"\n[github]\nper_page = 500\n").unwrap_err();
        assert!(err.to_string().contains("per_page"));
    }

    #[test]
    fn test_rejects_non_http_api_url() {
        assert!(parse_config("[db]\npath = \"x\"\n[github]\napi_url = \"ftp://x\"\n").is_err());
    }
}
