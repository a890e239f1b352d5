//! Retry and backoff configuration shared by the vendor API clients.

use std::time::Duration;

/// Retry behavior for HTTP requests against the vendor APIs.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,

    /// Initial backoff before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,

    /// Upper bound on any single backoff interval, in milliseconds.
    pub max_backoff_ms: u64,

    /// Multiplier applied to the backoff after each attempt.
    pub backoff_multiplier: f64,

    /// Whether to add random jitter to the backoff.
    pub use_jitter: bool,

    /// HTTP status codes that should be retried.
    pub retry_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            use_jitter: true,
            retry_status_codes: vec![429, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// Create a retry configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set the initial backoff in milliseconds.
    #[must_use]
    pub fn with_initial_backoff(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    /// Set the maximum backoff in milliseconds.
    #[must_use]
    pub fn with_max_backoff(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    /// Set the maximum number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Calculate the backoff duration for a given attempt number.
    ///
    /// Attempt 0 is the initial request and gets no backoff; attempt 1
    /// waits `initial_backoff_ms`, and each subsequent attempt multiplies
    /// by `backoff_multiplier` up to `max_backoff_ms`.
    #[must_use]
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exp = (attempt - 1) as i32;
        let base = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exp);
        let capped = base.min(self.max_backoff_ms as f64);

        let final_ms = if self.use_jitter {
            // Up to 25% random jitter to avoid thundering herds.
            let jitter = capped * 0.25 * rand_factor();
            capped + jitter
        } else {
            capped
        };

        Duration::from_millis(final_ms as u64)
    }

    /// Whether the given HTTP status code should be retried.
    #[must_use]
    pub fn should_retry(&self, status: u16) -> bool {
        self.retry_status_codes.contains(&status)
    }
}

/// Pseudo-random factor in [0, 1) derived from the clock.
///
/// Good enough for backoff jitter; avoids pulling in a full RNG crate.
fn rand_factor() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    f64::from(nanos % 1000) / 1000.0
}

/// Parse a `Retry-After` header value into a duration.
///
/// Accepts either a number of seconds or an HTTP-date; returns `None` if
/// the value is neither.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let when = chrono::DateTime::parse_from_rfc2822(value.trim()).ok()?;
    let delta = when.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_backoff_ms, 100);
        assert!(config.should_retry(429));
        assert!(config.should_retry(503));
        assert!(!config.should_retry(404));
        assert!(!config.should_retry(401));
    }

    #[test]
    fn test_disabled_config() {
        let config = RetryConfig::disabled();
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_backoff_first_attempt_is_zero() {
        let config = RetryConfig::default();
        assert_eq!(config.calculate_backoff(0), Duration::ZERO);
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let config = RetryConfig {
            use_jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(config.calculate_backoff(1), Duration::from_millis(100));
        assert_eq!(config.calculate_backoff(2), Duration::from_millis(200));
        assert_eq!(config.calculate_backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            use_jitter: false,
            max_backoff_ms: 250,
            ..RetryConfig::default()
        };
        assert_eq!(config.calculate_backoff(5), Duration::from_millis(250));
    }

    #[test]
    fn test_backoff_jitter_within_bounds() {
        let config = RetryConfig::default();
        let backoff = config.calculate_backoff(2);
        assert!(backoff >= Duration::from_millis(200));
        assert!(backoff <= Duration::from_millis(250));
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_parse_retry_after_past_date() {
        // A date in the past clamps to zero instead of failing.
        let parsed = parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parsed, Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_garbage() {
        assert_eq!(parse_retry_after("not-a-value"), None);
    }
}
