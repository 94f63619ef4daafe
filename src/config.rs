use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{GmailError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub bulk: BulkConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Discovery queries and limits for the sender analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_queries")]
    pub queries: Vec<String>,
    #[serde(default = "default_period_days")]
    pub period_days: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_per_query")]
    pub max_messages_per_query: usize,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_min_emails")]
    pub min_emails: usize,
    #[serde(default = "default_recent_subjects")]
    pub recent_subjects: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            queries: default_queries(),
            period_days: default_period_days(),
            page_size: default_page_size(),
            max_messages_per_query: default_max_per_query(),
            max_messages: default_max_messages(),
            batch_size: default_batch_size(),
            max_concurrent_requests: default_max_concurrent(),
            min_emails: default_min_emails(),
            recent_subjects: default_recent_subjects(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkConfig {
    #[serde(default = "default_bulk_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_modify_batch_size")]
    pub modify_batch_size: usize,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_unread_restore_count")]
    pub unread_restore_count: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            page_size: default_bulk_page_size(),
            max_pages: default_max_pages(),
            modify_batch_size: default_modify_batch_size(),
            page_delay_ms: default_page_delay_ms(),
            batch_delay_ms: default_batch_delay_ms(),
            unread_restore_count: default_unread_restore_count(),
        }
    }
}

/// Client settings for third-party unsubscribe/subscribe pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_one_click_timeout_secs")]
    pub one_click_timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_buttons")]
    pub max_buttons: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            one_click_timeout_secs: default_one_click_timeout_secs(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            max_buttons: default_max_buttons(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
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

fn default_queries() -> Vec<String> {
    vec![
        "unsubscribe".to_string(),
        "newsletter".to_string(),
        "subscription OR digest OR weekly".to_string(),
        "category:promotions".to_string(),
        "category:updates".to_string(),
    ]
}

fn default_period_days() -> u32 {
    180
}

fn default_page_size() -> u32 {
    100
}

fn default_max_per_query() -> usize {
    500
}

fn default_max_messages() -> usize {
    2000
}

fn default_batch_size() -> usize {
    50
}

fn default_max_concurrent() -> usize {
    20
}

fn default_min_emails() -> usize {
    2
}

fn default_recent_subjects() -> usize {
    5
}

fn default_bulk_page_size() -> u32 {
    500
}

fn default_max_pages() -> usize {
    50
}

fn default_modify_batch_size() -> usize {
    1000
}

fn default_page_delay_ms() -> u64 {
    50
}

fn default_batch_delay_ms() -> u64 {
    100
}

fn default_unread_restore_count() -> usize {
    20
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_one_click_timeout_secs() -> u64 {
    10
}

fn default_max_redirects() -> usize {
    10
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_max_buttons() -> usize {
    3
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".gmail-newsletters/newsletters.db")
}

fn default_bind() -> String {
    "127.0.0.1:3001".to_string()
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GmailError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GmailError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GmailError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let analysis = &self.analysis;

        if analysis.queries.is_empty() || analysis.queries.iter().any(|q| q.trim().is_empty()) {
            return Err(GmailError::ConfigError(
                "analysis.queries must contain at least one non-empty query".to_string(),
            ));
        }
        if analysis.period_days == 0 || analysis.period_days > 3650 {
            return Err(GmailError::ConfigError(
                "analysis.period_days must be between 1 and 3650".to_string(),
            ));
        }
        if analysis.page_size == 0 || analysis.page_size > 500 {
            return Err(GmailError::ConfigError(
                "analysis.page_size must be between 1 and 500".to_string(),
            ));
        }
        if analysis.batch_size == 0 {
            return Err(GmailError::ConfigError(
                "analysis.batch_size must be at least 1".to_string(),
            ));
        }

        // Gmail allows 250 quota units/sec per user
        if analysis.max_concurrent_requests == 0 || analysis.max_concurrent_requests > 50 {
            return Err(GmailError::ConfigError(
                "analysis.max_concurrent_requests must be between 1 and 50".to_string(),
            ));
        }
        if analysis.min_emails == 0 {
            return Err(GmailError::ConfigError(
                "analysis.min_emails must be at least 1".to_string(),
            ));
        }

        if self.bulk.page_size == 0 || self.bulk.page_size > 500 {
            return Err(GmailError::ConfigError(
                "bulk.page_size must be between 1 and 500".to_string(),
            ));
        }
        if self.bulk.max_pages == 0 {
            return Err(GmailError::ConfigError(
                "bulk.max_pages must be at least 1".to_string(),
            ));
        }
        if self.bulk.modify_batch_size == 0 || self.bulk.modify_batch_size > 1000 {
            return Err(GmailError::ConfigError(
                "bulk.modify_batch_size must be between 1 and 1000".to_string(),
            ));
        }

        if self.http.timeout_secs == 0 || self.http.one_click_timeout_secs == 0 {
            return Err(GmailError::ConfigError(
                "http timeouts must be greater than 0".to_string(),
            ));
        }

        if self.store.path.as_os_str().is_empty() {
            return Err(GmailError::ConfigError(
                "store.path cannot be empty".to_string(),
            ));
        }

        self.bind_addr()?;

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server.bind.parse().map_err(|e| {
            GmailError::ConfigError(format!(
                "server.bind '{}' is not a socket address: {}",
                self.server.bind, e
            ))
        })
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
