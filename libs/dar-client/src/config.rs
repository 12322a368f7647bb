//! Client configuration.
//!
//! Durations are written as humantime strings (`"30s"`, `"1m 30s"`).

use crate::error::DarError;
use dar_http::{
    ConcurrencyConfig, ExponentialBackoff, HttpClientConfig, RetryConfig, TransportSecurity,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Public DAR endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.dataforsyningen.dk";

/// Identifiers per batch request
pub const DEFAULT_CHUNK_SIZE: usize = 150;

/// Default User-Agent for DAR requests
pub const DEFAULT_USER_AGENT: &str = concat!("dar-client/", env!("CARGO_PKG_VERSION"));

/// DAR client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DarClientConfig {
    /// Base URL of the DAR API.
    pub base_url: String,

    /// Maximum identifiers per batch request.
    pub chunk_size: usize,

    /// Maximum in-flight requests; further requests wait for a free slot.
    pub max_connections: usize,

    /// Fail requests beyond `max_connections` with an overload error instead
    /// of queueing them.
    pub shed_load: bool,

    /// Timeout for one request attempt.
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,

    /// Default timeout for the health check.
    #[serde(with = "duration_str")]
    pub health_timeout: Duration,

    pub user_agent: String,

    /// Permit `http://` base URLs. For local mock servers only.
    pub allow_insecure_http: bool,

    /// Retry policy for transient failures; `null` disables retries.
    pub retry: Option<RetryPolicy>,
}

impl Default for DarClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_connections: 10,
            shed_load: false,
            request_timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(5),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            allow_insecure_http: false,
            retry: Some(RetryPolicy::default()),
        }
    }
}

/// Retry policy for transient network failures and 5xx/429 replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: usize,

    #[serde(with = "duration_str")]
    pub initial_backoff: Duration,

    #[serde(with = "duration_str")]
    pub max_backoff: Duration,

    pub multiplier: f64,

    /// Stretch each delay by up to 25% at random.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Translate into the HTTP layer's retry configuration
    #[must_use]
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::with_max_attempts(
            self.max_attempts,
            ExponentialBackoff {
                initial: self.initial_backoff,
                max: self.max_backoff,
                multiplier: self.multiplier,
                jitter: self.jitter,
            },
        )
    }
}

impl DarClientConfig {
    /// Configuration pointing at `base_url`, everything else default
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Check the configuration and return the parsed base URL.
    ///
    /// # Errors
    ///
    /// Returns `DarError::InvalidConfig` for a zero chunk size, zero connections,
    /// zero retry attempts, an unparsable base URL, or an `http://` base URL
    /// without `allow_insecure_http`.
    pub fn validate(&self) -> Result<Url, DarError> {
        if self.chunk_size == 0 {
            return Err(DarError::InvalidConfig("chunk_size must be at least 1".to_owned()));
        }
        if self.max_connections == 0 {
            return Err(DarError::InvalidConfig(
                "max_connections must be at least 1".to_owned(),
            ));
        }
        if let Some(retry) = &self.retry
            && retry.max_attempts == 0
        {
            return Err(DarError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_owned(),
            ));
        }

        let url = Url::parse(&self.base_url).map_err(|e| {
            DarError::InvalidConfig(format!("base_url '{}': {e}", self.base_url))
        })?;
        match url.scheme() {
            "https" => {}
            "http" if self.allow_insecure_http => {}
            "http" => {
                return Err(DarError::InvalidConfig(format!(
                    "base_url '{}' uses http:// but allow_insecure_http is false",
                    self.base_url
                )));
            }
            other => {
                return Err(DarError::InvalidConfig(format!(
                    "base_url scheme '{other}' is not supported"
                )));
            }
        }
        if url.host_str().is_none() {
            return Err(DarError::InvalidConfig(format!(
                "base_url '{}' has no host",
                self.base_url
            )));
        }
        Ok(url)
    }

    /// HTTP client settings derived from this configuration
    #[must_use]
    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            request_timeout: self.request_timeout,
            user_agent: self.user_agent.clone(),
            retry: self.retry.as_ref().map(RetryPolicy::to_retry_config),
            concurrency: Some(if self.shed_load {
                ConcurrencyConfig::fail_fast(self.max_connections)
            } else {
                ConcurrencyConfig::waiting(self.max_connections)
            }),
            transport: if self.allow_insecure_http {
                TransportSecurity::AllowInsecureHttp
            } else {
                TransportSecurity::TlsOnly
            },
            pool_max_idle_per_host: self.max_connections,
            ..HttpClientConfig::default()
        }
    }
}

/// Serde adapter for `Duration` as a humantime string
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(de::Error::custom)
    }
}
