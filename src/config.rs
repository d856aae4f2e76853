//! Configuration structures and loading logic

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the DLHub management service
    pub service_address: String,
    /// Base URL of the search service
    pub search_address: String,
    /// Search index holding servable records
    pub search_index: String,
    /// Timeout for any call to the service (no timeout when unset)
    pub http_timeout_secs: Option<u64>,
    pub poll_interval_ms: u64,
    pub max_poll_backoff_secs: u64,
    pub max_transient_poll_failures: u32,

    /// File holding the DLHub access token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,

    /// File holding the search access token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_token_file: Option<PathBuf>,

    /// Directory with schema files overriding the embedded copies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_address: default_service_address(),
            search_address: default_search_address(),
            search_index: default_search_index(),
            http_timeout_secs: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_backoff_secs: default_max_poll_backoff_secs(),
            max_transient_poll_failures: default_max_transient_poll_failures(),
            token_file: None,
            search_token_file: None,
            schema_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from file with environment variable overrides
    ///
    /// Without an explicit path, `~/.dlhub/config.toml` is read when it exists.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.or_else(|| default_config_path().filter(|p| p.exists()));

        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        // Environment variable overrides
        if let Ok(address) = std::env::var("DLHUB_SERVICE_ADDRESS") {
            config.service_address = address;
        }
        if let Ok(address) = std::env::var("DLHUB_SEARCH_ADDRESS") {
            config.search_address = address;
        }
        if let Ok(index) = std::env::var("DLHUB_SEARCH_INDEX") {
            config.search_index = index;
        }
        if let Ok(timeout) = std::env::var("DLHUB_HTTP_TIMEOUT") {
            config.http_timeout_secs =
                Some(timeout.parse().context("Invalid DLHUB_HTTP_TIMEOUT value")?);
        }
        if let Ok(interval) = std::env::var("DLHUB_POLL_INTERVAL_MS") {
            config.poll_interval_ms = interval
                .parse()
                .context("Invalid DLHUB_POLL_INTERVAL_MS value")?;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (field, address) in [
            ("service_address", &self.service_address),
            ("search_address", &self.search_address),
        ] {
            if !(address.starts_with("http://") || address.starts_with("https://")) {
                anyhow::bail!("{} must be an http(s) URL (got '{}')", field, address);
            }
        }

        if self.search_index.is_empty() {
            anyhow::bail!("search_index cannot be empty");
        }
        if self.search_index.contains('/') {
            anyhow::bail!(
                "search_index '{}' cannot contain path separators",
                self.search_index
            );
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }
        if self.http_timeout_secs == Some(0) {
            anyhow::bail!("http_timeout_secs must be greater than zero when set");
        }
        if let Some(dir) = &self.schema_dir
            && !dir.is_dir()
        {
            anyhow::bail!("schema_dir {:?} is not a directory", dir);
        }

        Ok(())
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_poll_backoff(&self) -> Duration {
        Duration::from_secs(self.max_poll_backoff_secs)
    }
}

/// Directory holding the user's DLHub settings and credentials
pub fn dlhub_home() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".dlhub"))
}

fn default_config_path() -> Option<PathBuf> {
    dlhub_home().map(|h| h.join("config.toml"))
}

// Default functions
fn default_service_address() -> String {
    "https://api.dlhub.org/api/v1".to_string()
}
fn default_search_address() -> String {
    "https://search.api.globus.org".to_string()
}
fn default_search_index() -> String {
    "dlhub".to_string()
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_max_poll_backoff_secs() -> u64 {
    60
}
fn default_max_transient_poll_failures() -> u32 {
    10
}
