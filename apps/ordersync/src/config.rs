//! Application configuration loaded from environment variables.
//!
//! Fail-fast loading: required variables must be present and valid or the
//! process exits with a clear error message before touching any API.

use std::env;
use std::time::Duration;

use thiserror::Error;

use ordersync_engine::RetryPolicy;

/// Configuration errors that can occur during environment loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Commerce platform API base URL.
    pub source_base_url: String,

    /// Commerce platform API token.
    pub source_token: String,

    /// Fulfillment service API base URL.
    pub fulfillment_base_url: String,

    /// Fulfillment service API key.
    pub fulfillment_api_key: String,

    /// Fulfillment service API secret.
    pub fulfillment_api_secret: String,

    /// SQLite database URL for the ledger.
    pub database_url: String,

    /// Name of the issue tag in the fulfillment service.
    pub issue_tag_name: String,

    /// Interval between reconciliation passes.
    pub poll_interval: Duration,

    /// Scan window for the very first pass.
    pub first_run_lookback: chrono::Duration,

    /// Source order status filters; empty means unfiltered.
    pub status_filters: Vec<String>,

    /// Page size for source scans.
    pub page_size: u32,

    /// Minimum delay between consecutive tag applications.
    pub tag_pacing: Duration,

    /// Revisit policy for orders already in the ledger.
    pub retry_policy: RetryPolicy,

    /// HTTP server bind address.
    pub host: String,

    /// HTTP server listen port.
    pub port: u16,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("source_base_url", &self.source_base_url)
            .field("source_token", &"[redacted]")
            .field("fulfillment_base_url", &self.fulfillment_base_url)
            .field("fulfillment_api_key", &"[redacted]")
            .field("fulfillment_api_secret", &"[redacted]")
            .field("database_url", &self.database_url)
            .field("issue_tag_name", &self.issue_tag_name)
            .field("poll_interval", &self.poll_interval)
            .field("status_filters", &self.status_filters)
            .field("page_size", &self.page_size)
            .field("tag_pacing", &self.tag_pacing)
            .field("retry_policy", &self.retry_policy)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

fn required(var: &str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::MissingVar(var.to_string()))
}

fn parsed_or<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(s) => s.parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            message: format!("Could not parse '{s}'"),
        }),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Required Variables
    ///
    /// - `SOURCE_API_BASE_URL` - Commerce platform API base URL
    /// - `SOURCE_API_TOKEN` - Commerce platform API token
    /// - `FULFILLMENT_API_BASE_URL` - Fulfillment service API base URL
    /// - `FULFILLMENT_API_KEY` - Fulfillment service API key
    /// - `FULFILLMENT_API_SECRET` - Fulfillment service API secret
    ///
    /// # Optional Variables
    ///
    /// - `ORDERSYNC_DATABASE_URL` - Ledger database (default: "sqlite:ordersync.db")
    /// - `ADDRESS_ISSUE_TAG` - Tag name (default: "Address Issue")
    /// - `POLL_INTERVAL_SECS` - Pass interval (default: 300)
    /// - `FIRST_RUN_LOOKBACK_HOURS` - First-pass scan window (default: 24)
    /// - `SOURCE_STATUS_FILTERS` - Comma-separated status filters (default: none)
    /// - `SOURCE_PAGE_SIZE` - Scan page size (default: 50)
    /// - `TAG_PACING_MS` - Delay between tag applications (default: 500)
    /// - `RETRY_UNRESOLVED` - Revisit unresolved orders (default: true)
    /// - `HOST` - Bind address (default: "0.0.0.0")
    /// - `PORT` - Listen port (default: 8080)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development only)
        let _ = dotenvy::dotenv();

        let source_base_url = required("SOURCE_API_BASE_URL")?;
        let source_token = required("SOURCE_API_TOKEN")?;
        let fulfillment_base_url = required("FULFILLMENT_API_BASE_URL")?;
        let fulfillment_api_key = required("FULFILLMENT_API_KEY")?;
        let fulfillment_api_secret = required("FULFILLMENT_API_SECRET")?;

        let database_url = env::var("ORDERSYNC_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:ordersync.db".to_string());

        let issue_tag_name =
            env::var("ADDRESS_ISSUE_TAG").unwrap_or_else(|_| "Address Issue".to_string());
        if issue_tag_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                var: "ADDRESS_ISSUE_TAG".to_string(),
                message: "Tag name must not be empty".to_string(),
            });
        }

        let poll_interval_secs: u64 = parsed_or("POLL_INTERVAL_SECS", 300)?;
        if poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                var: "POLL_INTERVAL_SECS".to_string(),
                message: "Interval must be at least 1 second".to_string(),
            });
        }

        let lookback_hours: i64 = parsed_or("FIRST_RUN_LOOKBACK_HOURS", 24)?;
        if lookback_hours <= 0 {
            return Err(ConfigError::InvalidValue {
                var: "FIRST_RUN_LOOKBACK_HOURS".to_string(),
                message: "Lookback must be positive".to_string(),
            });
        }

        let status_filters = env::var("SOURCE_STATUS_FILTERS")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let page_size: u32 = parsed_or("SOURCE_PAGE_SIZE", 50)?;
        if page_size == 0 {
            return Err(ConfigError::InvalidValue {
                var: "SOURCE_PAGE_SIZE".to_string(),
                message: "Page size must be at least 1".to_string(),
            });
        }

        let tag_pacing_ms: u64 = parsed_or("TAG_PACING_MS", 500)?;

        let retry_policy = match env::var("RETRY_UNRESOLVED") {
            Ok(s) => match s.to_lowercase().as_str() {
                "true" | "1" | "yes" => RetryPolicy::UnresolvedOnly,
                "false" | "0" | "no" => RetryPolicy::Never,
                other => {
                    return Err(ConfigError::InvalidValue {
                        var: "RETRY_UNRESOLVED".to_string(),
                        message: format!("Expected a boolean, got '{other}'"),
                    })
                }
            },
            Err(_) => RetryPolicy::UnresolvedOnly,
        };

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = parsed_or("PORT", 8080)?;
        if port == 0 {
            return Err(ConfigError::InvalidValue {
                var: "PORT".to_string(),
                message: "Port must be between 1 and 65535".to_string(),
            });
        }

        Ok(Config {
            source_base_url,
            source_token,
            fulfillment_base_url,
            fulfillment_api_key,
            fulfillment_api_secret,
            database_url,
            issue_tag_name,
            poll_interval: Duration::from_secs(poll_interval_secs),
            first_run_lookback: chrono::Duration::hours(lookback_hours),
            status_filters,
            page_size,
            tag_pacing: Duration::from_millis(tag_pacing_ms),
            retry_policy,
            host,
            port,
        })
    }

    /// Get the server bind address as a socket address string.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
