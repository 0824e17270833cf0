use anyhow::{anyhow, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::models::{CrawlMode, SortMode};
use crate::retry::RetryPolicy;
use crate::validation::InputValidator;

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub source: SourceConfig,
    pub crawl: CrawlConfig,
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

/// Content source connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    pub community: String,
    pub user_agent: String,
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl SourceConfig {
    /// Retry policy for calls against the source
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_base_delay_ms))
    }
}

/// Crawl session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    pub cold_start_sort: String,
    pub top_window: String,
    pub cold_start_submission_limit: usize,
    pub cold_start_comment_limit: usize,
    pub incremental_submission_limit: usize,
    pub incremental_comment_limit: usize,
    pub poll_interval_secs: u64,
    pub flush_threshold: usize,
    pub concurrency: usize,
}

impl CrawlConfig {
    /// Cold-start mode from the configured sort and window
    pub fn cold_start_mode(&self) -> crate::error::Result<CrawlMode> {
        Ok(CrawlMode::ColdStart(SortMode::parse(&self.cold_start_sort, &self.top_window)?))
    }
}

/// Ticker registry bootstrap settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub iex_token: Option<String>,
    pub iex_base_url: String,
    pub csv_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/mentions.db".to_string(),
                max_connections: 10,
                connection_timeout_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
            source: SourceConfig {
                base_url: "https://www.reddit.com".to_string(),
                community: "wallstreetbets".to_string(),
                user_agent: concat!("ticker-mentions/", env!("CARGO_PKG_VERSION")).to_string(),
                access_token: None,
                request_timeout_secs: 30,
                max_retries: 3,
                retry_base_delay_ms: 500,
            },
            crawl: CrawlConfig {
                cold_start_sort: "top".to_string(),
                top_window: "all".to_string(),
                cold_start_submission_limit: 100,
                cold_start_comment_limit: 32,
                incremental_submission_limit: 100,
                incremental_comment_limit: 32,
                poll_interval_secs: 300,
                flush_threshold: 100,
                concurrency: 4,
            },
            registry: RegistryConfig {
                iex_token: None,
                iex_base_url: "https://cloud.iexapis.com/stable".to_string(),
                csv_path: None,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, adding `path` as the highest-precedence file
    pub fn load_from(path: Option<&str>) -> Result<Self> {
        // Start with default values
        let mut builder = Config::builder();
        for (key, value) in Self::default() {
            builder = builder.set_default(key, value)?;
        }

        // Add config files if they exist
        builder = builder
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("config").required(false));
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Add environment variables with prefix, e.g. TICKER_MENTIONS_CRAWL__CONCURRENCY
        let config = builder
            .add_source(
                Environment::with_prefix("TICKER_MENTIONS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| anyhow!("Failed to load configuration: {e}"))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {e}"))?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate database config
        InputValidator::validate_database_url(&self.database.url)?;
        if self.database.max_connections == 0 {
            return Err(anyhow!("max_connections must be greater than 0"));
        }
        if self.database.connection_timeout_secs == 0 {
            return Err(anyhow!("connection_timeout_secs must be greater than 0"));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        // Validate source config
        InputValidator::new()?.validate_community(&self.source.community)?;
        if self.source.base_url.trim().is_empty() {
            return Err(anyhow!("source base_url cannot be empty"));
        }
        if self.source.user_agent.trim().is_empty() {
            return Err(anyhow!("source user_agent cannot be empty"));
        }
        if self.source.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be greater than 0"));
        }
        if self.source.max_retries == 0 {
            return Err(anyhow!("max_retries must be greater than 0"));
        }

        // Validate crawl config
        self.crawl.cold_start_mode()?;
        InputValidator::validate_limit("cold_start_submission_limit", self.crawl.cold_start_submission_limit)?;
        InputValidator::validate_limit("incremental_submission_limit", self.crawl.incremental_submission_limit)?;
        InputValidator::validate_flush_threshold(self.crawl.flush_threshold)?;
        InputValidator::validate_concurrency(self.crawl.concurrency)?;
        if self.crawl.poll_interval_secs == 0 {
            return Err(anyhow!("poll_interval_secs must be greater than 0"));
        }

        Ok(())
    }

    /// Get database URL from environment or config
    pub fn get_database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.database.url.clone())
    }

    /// Get log level from environment or config
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }

    /// Get the IEX token from environment or config
    pub fn get_iex_token(&self) -> Option<String> {
        std::env::var("IEX_TOKEN")
            .ok()
            .or_else(|| self.registry.iex_token.clone())
            .filter(|t| !t.is_empty())
    }
}

impl IntoIterator for AppConfig {
    type Item = (String, config::Value);
    type IntoIter = std::collections::hash_map::IntoIter<String, config::Value>;

    fn into_iter(self) -> Self::IntoIter {
        let mut map = HashMap::new();

        // Flatten the configuration into key-value pairs
        map.insert("database.url".to_string(), config::Value::from(self.database.url));
        map.insert("database.max_connections".to_string(), config::Value::from(i64::from(self.database.max_connections)));
        map.insert("database.connection_timeout_secs".to_string(), config::Value::from(self.database.connection_timeout_secs as i64));

        map.insert("logging.level".to_string(), config::Value::from(self.logging.level));
        if let Some(file_path) = self.logging.file_path {
            map.insert("logging.file_path".to_string(), config::Value::from(file_path));
        }
        map.insert("logging.format".to_string(), config::Value::from(self.logging.format));

        map.insert("source.base_url".to_string(), config::Value::from(self.source.base_url));
        map.insert("source.community".to_string(), config::Value::from(self.source.community));
        map.insert("source.user_agent".to_string(), config::Value::from(self.source.user_agent));
        if let Some(token) = self.source.access_token {
            map.insert("source.access_token".to_string(), config::Value::from(token));
        }
        map.insert("source.request_timeout_secs".to_string(), config::Value::from(self.source.request_timeout_secs as i64));
        map.insert("source.max_retries".to_string(), config::Value::from(i64::from(self.source.max_retries)));
        map.insert("source.retry_base_delay_ms".to_string(), config::Value::from(self.source.retry_base_delay_ms as i64));

        map.insert("crawl.cold_start_sort".to_string(), config::Value::from(self.crawl.cold_start_sort));
        map.insert("crawl.top_window".to_string(), config::Value::from(self.crawl.top_window));
        map.insert("crawl.cold_start_submission_limit".to_string(), config::Value::from(self.crawl.cold_start_submission_limit as i64));
        map.insert("crawl.cold_start_comment_limit".to_string(), config::Value::from(self.crawl.cold_start_comment_limit as i64));
        map.insert("crawl.incremental_submission_limit".to_string(), config::Value::from(self.crawl.incremental_submission_limit as i64));
        map.insert("crawl.incremental_comment_limit".to_string(), config::Value::from(self.crawl.incremental_comment_limit as i64));
        map.insert("crawl.poll_interval_secs".to_string(), config::Value::from(self.crawl.poll_interval_secs as i64));
        map.insert("crawl.flush_threshold".to_string(), config::Value::from(self.crawl.flush_threshold as i64));
        map.insert("crawl.concurrency".to_string(), config::Value::from(self.crawl.concurrency as i64));

        if let Some(token) = self.registry.iex_token {
            map.insert("registry.iex_token".to_string(), config::Value::from(token));
        }
        map.insert("registry.iex_base_url".to_string(), config::Value::from(self.registry.iex_base_url));
        if let Some(csv_path) = self.registry.csv_path {
            map.insert("registry.csv_path".to_string(), config::Value::from(csv_path));
        }

        map.into_iter()
    }
}
