//! Fulfillment service client.
//!
//! Looks up orders by order number and applies tags through the
//! fulfillment service's REST API. The vendor's order-number search is
//! fuzzy, so lookups filter the results down to exact matches.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{header, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{ConnectorError, ConnectorResult};
use crate::retry::{parse_retry_after, RetryConfig};
use crate::traits::FulfillmentOps;
use crate::types::{DestinationOrder, TagId};

/// Configuration for the fulfillment service client.
#[derive(Debug, Clone)]
pub struct FulfillmentConfig {
    /// Base URL of the fulfillment API.
    pub base_url: String,

    /// API key, used as the basic-auth username.
    pub api_key: String,

    /// API secret, used as the basic-auth password.
    pub api_secret: String,

    /// Connection timeout in seconds.
    pub connection_timeout_secs: u64,

    /// Read timeout in seconds.
    pub read_timeout_secs: u64,

    /// Retry behavior for transient failures.
    pub retry: RetryConfig,
}

impl FulfillmentConfig {
    /// Create a configuration with default timeouts and retry settings.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
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
        if self.api_key.is_empty() || self.api_secret.is_empty() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "api_key and api_secret must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Copy of the configuration with credentials masked, for logging.
    #[must_use]
    pub fn redacted(&self) -> Self {
        Self {
            api_key: "***".to_string(),
            api_secret: "***".to_string(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireDestinationOrder {
    #[serde(rename = "orderId")]
    order_id: i64,
    #[serde(rename = "orderNumber")]
    order_number: String,
}

#[derive(Debug, Deserialize)]
struct WireOrderSearch {
    #[serde(default)]
    orders: Vec<WireDestinationOrder>,
}

#[derive(Debug, Deserialize)]
struct WireTag {
    #[serde(rename = "tagId")]
    tag_id: i64,
    name: String,
}

/// HTTP client for the fulfillment service.
pub struct FulfillmentClient {
    config: FulfillmentConfig,
    client: Client,
    auth_header: String,
}

impl std::fmt::Debug for FulfillmentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FulfillmentClient")
            .field("config", &self.config.redacted())
            .finish()
    }
}

impl FulfillmentClient {
    /// Create a new client with the given configuration.
    pub fn new(config: FulfillmentConfig) -> ConnectorResult<Self> {
        config.validate()?;

        let credentials = format!("{}:{}", config.api_key, config.api_secret);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        let auth_header = format!("Basic {encoded}");

        let client = Client::builder()
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connection_timeout_secs))
            .build()
            .map_err(|e| ConnectorError::InvalidConfiguration {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            config,
            client,
            auth_header,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Send a request with retry on transient failures.
    async fn send_with_retry(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> ConnectorResult<Response> {
        let retry_config = &self.config.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut request = self
                .client
                .request(method.clone(), url)
                .header(header::AUTHORIZATION, &self.auth_header)
                .header(header::ACCEPT, "application/json");
            if let Some(json_body) = body {
                request = request.json(json_body);
            }

            debug!(url = %url, method = %method, attempt = attempt, "Sending fulfillment API request");

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

    async fn check_status(response: Response) -> ConnectorResult<Response> {
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    ConnectorError::AuthenticationFailed
                }
                StatusCode::TOO_MANY_REQUESTS => ConnectorError::RateLimited {
                    message: body,
                },
                StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::BAD_GATEWAY
                | StatusCode::GATEWAY_TIMEOUT => ConnectorError::Unavailable {
                    message: format!("HTTP {status}: {body}"),
                },
                _ => ConnectorError::operation_failed(format!("HTTP {status}: {body}")),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl FulfillmentOps for FulfillmentClient {
    async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> ConnectorResult<Option<DestinationOrder>> {
        let mut url = reqwest::Url::parse(&self.url("/orders")).map_err(|e| {
            ConnectorError::InvalidConfiguration {
                message: format!("Invalid base_url: {e}"),
            }
        })?;
        url.query_pairs_mut().append_pair("orderNumber", order_number);

        let response = self
            .send_with_retry(reqwest::Method::GET, url.as_str(), None)
            .await?;
        let response = Self::check_status(response).await?;

        let body: WireOrderSearch = response.json().await.map_err(|e| {
            ConnectorError::invalid_data(format!("Failed to parse order search response: {e}"))
        })?;

        // The search is a prefix match on the vendor side; keep only the
        // exact order number.
        let found = body
            .orders
            .into_iter()
            .find(|o| o.order_number == order_number)
            .map(|o| DestinationOrder {
                id: o.order_id.to_string(),
                order_number: o.order_number,
            });

        Ok(found)
    }

    async fn apply_tag(&self, destination_id: &str, tag: TagId) -> ConnectorResult<()> {
        let order_id: i64 = destination_id.parse().map_err(|_| {
            ConnectorError::invalid_data(format!(
                "Destination order id is not numeric: {destination_id}"
            ))
        })?;

        let body = json!({ "orderId": order_id, "tagId": tag.0 });
        let response = self
            .send_with_retry(reqwest::Method::POST, &self.url("/orders/addtag"), Some(&body))
            .await?;
        Self::check_status(response).await?;

        debug!(order_id = order_id, tag_id = %tag, "Applied tag");
        Ok(())
    }

    async fn resolve_tag_id(&self, name: &str) -> ConnectorResult<Option<TagId>> {
        let response = self
            .send_with_retry(reqwest::Method::GET, &self.url("/accounts/listtags"), None)
            .await?;
        let response = Self::check_status(response).await?;

        let tags: Vec<WireTag> = response.json().await.map_err(|e| {
            ConnectorError::invalid_data(format!("Failed to parse tag list response: {e}"))
        })?;

        let found = tags
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .map(|t| TagId(t.tag_id));

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(
            FulfillmentConfig::new("https://api.example.com", "key", "secret")
                .validate()
                .is_ok()
        );
        assert!(FulfillmentConfig::new("", "key", "secret")
            .validate()
            .is_err());
        assert!(FulfillmentConfig::new("https://api.example.com", "", "secret")
            .validate()
            .is_err());
        assert!(FulfillmentConfig::new("https://api.example.com", "key", "")
            .validate()
            .is_err());
    }

    #[test]
    fn test_redacted_masks_credentials() {
        let config = FulfillmentConfig::new("https://api.example.com", "key", "secret");
        let redacted = config.redacted();
        assert_eq!(redacted.api_key, "***");
        assert_eq!(redacted.api_secret, "***");
    }

    #[test]
    fn test_wire_order_parsing() {
        let body: WireOrderSearch = serde_json::from_value(serde_json::json!({
            "orders": [
                { "orderId": 900123, "orderNumber": "1001" },
                { "orderId": 900124, "orderNumber": "1001-1" }
            ],
            "total": 2
        }))
        .unwrap();

        assert_eq!(body.orders.len(), 2);
        assert_eq!(body.orders[0].order_id, 900_123);
    }
}
