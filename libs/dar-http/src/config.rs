use std::collections::HashSet;
use std::time::Duration;

/// Default User-Agent string for HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!("dar-http/", env!("CARGO_PKG_VERSION"));

/// Conditions that trigger a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RetryTrigger {
    /// Transport-level errors (connection refused, DNS failure, reset, etc.)
    TransportError,
    /// Request attempt timed out
    Timeout,
    /// Specific HTTP status code
    Status(u16),
    /// Error that is never retried (e.g. `DeadlineExceeded`, `ServiceClosed`)
    NonRetryable,
}

impl RetryTrigger {
    /// HTTP 429 Too Many Requests
    pub const TOO_MANY_REQUESTS: Self = Self::Status(429);
    /// HTTP 408 Request Timeout
    pub const REQUEST_TIMEOUT: Self = Self::Status(408);
    /// HTTP 500 Internal Server Error
    pub const INTERNAL_SERVER_ERROR: Self = Self::Status(500);
    /// HTTP 502 Bad Gateway
    pub const BAD_GATEWAY: Self = Self::Status(502);
    /// HTTP 503 Service Unavailable
    pub const SERVICE_UNAVAILABLE: Self = Self::Status(503);
    /// HTTP 504 Gateway Timeout
    pub const GATEWAY_TIMEOUT: Self = Self::Status(504);
}

/// Check if HTTP method is idempotent (safe to retry) per RFC 9110.
#[must_use]
pub fn is_idempotent_method(method: &http::Method) -> bool {
    matches!(
        *method,
        http::Method::GET
            | http::Method::HEAD
            | http::Method::PUT
            | http::Method::DELETE
            | http::Method::OPTIONS
            | http::Method::TRACE
    )
}

/// Exponential backoff between retry attempts
///
/// Delay for attempt `n` (0-based) is `min(initial * multiplier^n, max)`,
/// optionally stretched by up to 25% of random jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Delay before the first retry (default: 100ms)
    pub initial: Duration,

    /// Upper bound for any single delay (default: 10s)
    pub max: Duration,

    /// Growth factor per attempt (default: 2.0)
    pub multiplier: f64,

    /// Add 0-25% random jitter to each delay (default: true)
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    /// Create backoff with custom initial and max durations
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Default::default()
        }
    }

    /// Fast backoff for tests (1ms initial, 100ms max, no jitter)
    #[must_use]
    pub fn fast() -> Self {
        Self {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

/// Retry policy
///
/// Triggers in `always_retry` apply to every method. Triggers in
/// `idempotent_retry` apply only to idempotent methods, which covers every
/// request the DAR client issues (they are all GETs).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial attempt (0 = no retries, default: 3).
    /// Total attempts = 1 + `max_retries`.
    pub max_retries: usize,

    /// Delay strategy between attempts
    pub backoff: ExponentialBackoff,

    /// Triggers that retry regardless of method. Default: `[Status(429)]`
    pub always_retry: HashSet<RetryTrigger>,

    /// Triggers that retry idempotent methods only.
    /// Default: `[TransportError, Timeout, 408, 500, 502, 503, 504]`
    pub idempotent_retry: HashSet<RetryTrigger>,

    /// Ignore `Retry-After` and always use the backoff policy (default: false)
    pub ignore_retry_after: bool,

    /// Maximum bytes drained from a retried response so the connection can be
    /// reused. Applies to decompressed bytes. Default: 64 KiB.
    pub retry_response_drain_limit: usize,
}

/// Default drain limit for response bodies before retry (64 KiB)
pub const DEFAULT_RETRY_RESPONSE_DRAIN_LIMIT: usize = 64 * 1024;

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: ExponentialBackoff::default(),
            always_retry: HashSet::from([RetryTrigger::TOO_MANY_REQUESTS]),
            idempotent_retry: HashSet::from([
                RetryTrigger::TransportError,
                RetryTrigger::Timeout,
                RetryTrigger::REQUEST_TIMEOUT,
                RetryTrigger::INTERNAL_SERVER_ERROR,
                RetryTrigger::BAD_GATEWAY,
                RetryTrigger::SERVICE_UNAVAILABLE,
                RetryTrigger::GATEWAY_TIMEOUT,
            ]),
            ignore_retry_after: false,
            retry_response_drain_limit: DEFAULT_RETRY_RESPONSE_DRAIN_LIMIT,
        }
    }
}

impl RetryConfig {
    /// Config with no retries
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Config bounded by a total attempt count (initial attempt included)
    ///
    /// `max_attempts` of 0 or 1 both mean "try once".
    #[must_use]
    pub fn with_max_attempts(max_attempts: usize, backoff: ExponentialBackoff) -> Self {
        Self {
            max_retries: max_attempts.saturating_sub(1),
            backoff,
            ..Default::default()
        }
    }

    /// Check if `trigger` should cause a retry for a request with `method`
    #[must_use]
    pub fn should_retry(&self, trigger: RetryTrigger, method: &http::Method) -> bool {
        if self.always_retry.contains(&trigger) {
            return true;
        }
        self.idempotent_retry.contains(&trigger) && is_idempotent_method(method)
    }
}

/// Concurrency limit on in-flight requests
#[derive(Debug, Clone)]
pub struct ConcurrencyConfig {
    /// Maximum concurrent requests (default: 10)
    pub max_concurrent_requests: usize,

    /// Reject requests with `HttpError::Overloaded` instead of queueing them
    /// when the limit is reached (default: false)
    pub shed_load: bool,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 10,
            shed_load: false,
        }
    }
}

impl ConcurrencyConfig {
    /// Queue requests beyond `max` until a slot frees up
    #[must_use]
    pub fn waiting(max: usize) -> Self {
        Self {
            max_concurrent_requests: max,
            shed_load: false,
        }
    }

    /// Fail fast with `Overloaded` beyond `max`
    #[must_use]
    pub fn fail_fast(max: usize) -> Self {
        Self {
            max_concurrent_requests: max,
            shed_load: true,
        }
    }
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// OS native root certificate store
    Native,
}

/// Transport security configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only)
    #[default]
    TlsOnly,
    /// Allow plain HTTP (mock servers in tests only)
    AllowInsecureHttp,
}

/// Overall HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-attempt timeout (default: 30 seconds)
    pub request_timeout: Duration,

    /// Deadline spanning all retry attempts (default: None)
    pub total_timeout: Option<Duration>,

    /// Maximum response body size in bytes (default: 10 MB)
    pub max_body_size: usize,

    /// User-Agent header value
    pub user_agent: String,

    /// Retry policy; `None` disables the retry layer
    pub retry: Option<RetryConfig>,

    /// In-flight request limit; `None` means unlimited
    pub concurrency: Option<ConcurrencyConfig>,

    /// Transport security mode (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Queue capacity in front of the service stack (default: 1024)
    pub buffer_capacity: usize,

    /// Idle connection timeout (default: 90 seconds)
    pub pool_idle_timeout: Option<Duration>,

    /// Idle connections kept per host (default: 10)
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            total_timeout: None,
            max_body_size: 10 * 1024 * 1024, // 10 MB
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            retry: Some(RetryConfig::default()),
            concurrency: Some(ConcurrencyConfig::default()),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            buffer_capacity: 1024,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 10,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_retry_trigger_constants() {
        assert_eq!(RetryTrigger::TOO_MANY_REQUESTS, RetryTrigger::Status(429));
        assert_eq!(RetryTrigger::REQUEST_TIMEOUT, RetryTrigger::Status(408));
        assert_eq!(RetryTrigger::GATEWAY_TIMEOUT, RetryTrigger::Status(504));
    }

    #[test]
    fn test_is_idempotent_method() {
        assert!(is_idempotent_method(&http::Method::GET));
        assert!(is_idempotent_method(&http::Method::HEAD));
        assert!(!is_idempotent_method(&http::Method::POST));
        assert!(!is_idempotent_method(&http::Method::PATCH));
    }

    #[test]
    fn test_retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff.initial, Duration::from_millis(100));
        assert!(config.backoff.jitter);
        assert_eq!(config.always_retry.len(), 1);
        assert_eq!(config.idempotent_retry.len(), 7);
        assert!(!config.ignore_retry_after);
    }

    #[test]
    fn test_with_max_attempts_counts_initial_attempt() {
        let config = RetryConfig::with_max_attempts(5, ExponentialBackoff::fast());
        assert_eq!(config.max_retries, 4);

        let config = RetryConfig::with_max_attempts(1, ExponentialBackoff::fast());
        assert_eq!(config.max_retries, 0);

        let config = RetryConfig::with_max_attempts(0, ExponentialBackoff::fast());
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_should_retry_get_on_server_errors() {
        let config = RetryConfig::default();
        assert!(config.should_retry(RetryTrigger::TransportError, &http::Method::GET));
        assert!(config.should_retry(RetryTrigger::Timeout, &http::Method::GET));
        assert!(config.should_retry(RetryTrigger::SERVICE_UNAVAILABLE, &http::Method::GET));
        assert!(config.should_retry(RetryTrigger::TOO_MANY_REQUESTS, &http::Method::GET));
    }

    #[test]
    fn test_should_retry_not_configured() {
        let config = RetryConfig::default();
        // A 404 is an answer, not a transient failure
        assert!(!config.should_retry(RetryTrigger::Status(404), &http::Method::GET));
        assert!(!config.should_retry(RetryTrigger::Status(400), &http::Method::GET));
        assert!(!config.should_retry(RetryTrigger::NonRetryable, &http::Method::GET));
        assert!(!config.should_retry(RetryTrigger::TransportError, &http::Method::POST));
    }

    #[test]
    fn test_concurrency_config_presets() {
        let config = ConcurrencyConfig::default();
        assert_eq!(config.max_concurrent_requests, 10);
        assert!(!config.shed_load);

        assert!(ConcurrencyConfig::fail_fast(3).shed_load);
        assert_eq!(ConcurrencyConfig::waiting(7).max_concurrent_requests, 7);
    }

    #[test]
    fn test_http_client_config_defaults() {
        let config = HttpClientConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert!(config.retry.is_some());
        assert_eq!(
            config.concurrency.map(|c| c.max_concurrent_requests),
            Some(10)
        );
        assert_eq!(config.transport, TransportSecurity::TlsOnly);
    }
}
