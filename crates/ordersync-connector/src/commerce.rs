//! Commerce platform client.
//!
//! Reads orders from the commerce platform's REST API with incremental
//! filtering on modification date and page-based continuation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header, Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ConnectorError, ConnectorResult};
use crate::retry::{parse_retry_after, RetryConfig};
use crate::traits::SourceOrders;
use crate::types::{OrderPage, SourceOrder};

/// Configuration for the commerce platform client.
#[derive(Debug, Clone)]
pub struct CommerceConfig {
    /// Base URL of the store API, e.g. `https://api.example.com/stores/abc/v2`.
    pub base_url: String,

    /// API access token, sent as the `X-Auth-Token` header.
    pub access_token: String,

    /// Connection timeout in seconds.
    pub connection_timeout_secs: u64,

    /// Read timeout in seconds.
    pub read_timeout_secs: u64,

    /// Retry behavior for transient failures.
    pub retry: RetryConfig,
}

impl CommerceConfig {
    /// Create a configuration with default timeouts and retry settings.
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: access_token.into(),
            connection_timeout_secs: 10,
            read_timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.base_url.is_empty() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "base_url must not be empty".to_string(),
            });
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConnectorError::InvalidConfiguration {
                message: format!("base_url must be an HTTP(S) URL: {}", self.base_url),
            });
        }
        if self.access_token.is_empty() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "access_token must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Copy of the configuration with credentials masked, for logging.
    #[must_use]
    pub fn redacted(&self) -> Self {
        Self {
            access_token: "***".to_string(),
            ..self.clone()
        }
    }
}

/// Wire representation of one order in the API response.
#[derive(Debug, Deserialize)]
struct WireOrder {
    id: serde_json::Value,
    order_number: String,
    date_modified: DateTime<Utc>,
    #[serde(default)]
    address_validation_status: Option<String>,
}

impl WireOrder {
    fn into_source_order(self) -> SourceOrder {
        // Vendor sends numeric ids; normalize to string.
        let id = match self.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        SourceOrder {
            id,
            order_number: self.order_number,
            modified_at: self.date_modified,
            address_status: self.address_validation_status,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WirePagination {
    current_page: u32,
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct WireMeta {
    pagination: WirePagination,
}

#[derive(Debug, Deserialize)]
struct WireOrdersResponse {
    #[serde(default)]
    data: Vec<WireOrder>,
    meta: WireMeta,
}

/// HTTP client for the commerce platform.
pub struct CommerceClient {
    config: CommerceConfig,
    client: Client,
}

impl std::fmt::Debug for CommerceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommerceClient")
            .field("config", &self.config.redacted())
            .finish()
    }
}

impl CommerceClient {
    /// Create a new client with the given configuration.
    pub fn new(config: CommerceConfig) -> ConnectorResult<Self> {
        config.validate()?;
        let client = build_client(&config)?;
        Ok(Self { config, client })
    }

    /// Send a GET request with retry on transient failures.
    async fn send_with_retry(&self, url: &str) -> ConnectorResult<Response> {
        let retry_config = &self.config.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let request = self
                .client
                .get(url)
                .header("X-Auth-Token", &self.config.access_token)
                .header(header::ACCEPT, "application/json");

            debug!(url = %url, attempt = attempt, "Sending commerce API request");

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if retry_config.should_retry(status.as_u16())
                        && attempt <= retry_config.max_retries
                    {
                        if status == StatusCode::TOO_MANY_REQUESTS {
                            let retry_after = resp
                                .headers()
                                .get(header::RETRY_AFTER)
                                .and_then(|v| v.to_str().ok())
                                .and_then(parse_retry_after);

                            let wait = retry_after
                                .unwrap_or_else(|| retry_config.calculate_backoff(attempt));

                            warn!(
                                url = %url,
                                attempt = attempt,
                                wait_ms = wait.as_millis(),
                                "Rate limited (429), waiting before retry"
                            );

                            tokio::time::sleep(wait).await;
                            continue;
                        }

                        let backoff = retry_config.calculate_backoff(attempt);
                        warn!(
                            url = %url,
                            status = %status,
                            attempt = attempt,
                            wait_ms = backoff.as_millis(),
                            "Transient error, retrying with backoff"
                        );

                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    if attempt <= retry_config.max_retries {
                        let backoff = retry_config.calculate_backoff(attempt);
                        warn!(
                            url = %url,
                            error = %e,
                            attempt = attempt,
                            wait_ms = backoff.as_millis(),
                            "Request failed, retrying with backoff"
                        );

                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    return Err(ConnectorError::connection_failed_with_source(
                        format!("Request failed after {attempt} attempts: {url}"),
                        e,
                    ));
                }
            }
        }
    }

    fn handle_response_error(status: StatusCode, body: &str) -> ConnectorError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ConnectorError::AuthenticationFailed
            }
            StatusCode::TOO_MANY_REQUESTS => ConnectorError::RateLimited {
                message: body.to_string(),
            },
            StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::BAD_GATEWAY
            | StatusCode::GATEWAY_TIMEOUT => ConnectorError::Unavailable {
                message: format!("HTTP {status}: {body}"),
            },
            _ => ConnectorError::operation_failed(format!("HTTP {status}: {body}")),
        }
    }
}

#[async_trait]
impl SourceOrders for CommerceClient {
    async fn fetch_page(
        &self,
        since: DateTime<Utc>,
        status_filter: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> ConnectorResult<OrderPage> {
        let mut url = reqwest::Url::parse(&format!(
            "{}/orders",
            self.config.base_url.trim_end_matches('/')
        ))
        .map_err(|e| ConnectorError::InvalidConfiguration {
            message: format!("Invalid base_url: {e}"),
        })?;
        url.query_pairs_mut()
            .append_pair(
                "min_date_modified",
                &since.to_rfc3339_opts(SecondsFormat::Secs, true),
            )
            .append_pair("page", &page.to_string())
            .append_pair("limit", &page_size.to_string());
        if let Some(status) = status_filter {
            url.query_pairs_mut().append_pair("status", status);
        }

        let response = self.send_with_retry(url.as_str()).await?;
        let status = response.status();

        // Vendor returns 204 for an empty result set instead of an empty page.
        if status == StatusCode::NO_CONTENT {
            return Ok(OrderPage {
                orders: Vec::new(),
                current_page: page,
                total_pages: page,
            });
        }

        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::handle_response_error(status, &body));
        }

        let body: WireOrdersResponse = response.json().await.map_err(|e| {
            ConnectorError::invalid_data(format!("Failed to parse orders response: {e}"))
        })?;

        debug!(
            page = body.meta.pagination.current_page,
            total_pages = body.meta.pagination.total_pages,
            count = body.data.len(),
            "Fetched order page"
        );

        Ok(OrderPage {
            orders: body
                .data
                .into_iter()
                .map(WireOrder::into_source_order)
                .collect(),
            current_page: body.meta.pagination.current_page,
            total_pages: body.meta.pagination.total_pages,
        })
    }
}

/// Build the reqwest client with configured timeouts.
fn build_client(config: &CommerceConfig) -> ConnectorResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.read_timeout_secs))
        .connect_timeout(Duration::from_secs(config.connection_timeout_secs))
        .build()
        .map_err(|e| ConnectorError::InvalidConfiguration {
            message: format!("Failed to build HTTP client: {e}"),
        })
}
