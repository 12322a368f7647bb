use crate::client::{BufferedService, HttpClient};
use crate::config::{
    ConcurrencyConfig, HttpClientConfig, RetryConfig, TlsRootConfig, TransportSecurity,
};
use crate::error::HttpError;
use crate::layers::{RetryLayer, UserAgentLayer};
use crate::response::ResponseBody;
use crate::tls;
use bytes::Bytes;
use http::Response;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;
use tower::buffer::Buffer;
use tower::limit::ConcurrencyLimitLayer;
use tower::load_shed::LoadShedLayer;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

type InnerService =
    BoxCloneService<http::Request<Full<Bytes>>, http::Response<ResponseBody>, HttpError>;

/// Builder for [`HttpClient`]
pub struct HttpClientBuilder {
    config: HttpClientConfig,
}

impl HttpClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: HttpClientConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self { config }
    }

    /// Per-attempt timeout; every retry gets a fresh one
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Deadline spanning every attempt and backoff
    #[must_use]
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.config.total_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: Option<RetryConfig>) -> Self {
        self.config.retry = retry;
        self
    }

    #[must_use]
    pub fn concurrency(mut self, concurrency: Option<ConcurrencyConfig>) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Allow plain HTTP, for mock servers in tests
    ///
    /// Only compiled into debug builds or with the `allow-insecure-http` feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(self) -> Self {
        self.transport(TransportSecurity::AllowInsecureHttp)
    }

    /// Request queue capacity; clamped to at least 1 since `tower::buffer` panics on 0
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Build the client. The buffer worker is spawned on the current Tokio runtime.
    ///
    /// # Errors
    /// Returns `HttpError::NoRuntime` outside a Tokio runtime, or an error if TLS
    /// setup fails or the user agent is not a valid header value
    pub fn build(self) -> Result<HttpClient, HttpError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(HttpError::NoRuntime);
        }
        let config = self.config;
        if config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!("insecure HTTP enabled; use only against local mock servers");
        }

        let https = tls::build_https_connector(config.tls_roots, config.transport)?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_idle_timeout has no effect without a pool timer
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host);
        if let Some(idle) = config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle);
        }
        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let ua_layer = UserAgentLayer::try_new(&config.user_agent)?;
        let timeout = config.request_timeout;

        // Outer to inner:
        //   Buffer → ConcurrencyLimit (+LoadShed) → Retry → Timeout →
        //   UserAgent → Decompression → hyper
        //
        // send() yields Ok(Response) for every status; non-2xx becomes an
        // error only through the HttpResponse readers.
        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(ua_layer)
            .layer(DecompressionLayer::new())
            .service(hyper_client)
            .map_response(box_response_body)
            .map_err(move |e: tower::BoxError| map_tower_error(e, timeout));

        let mut service: InnerService = service.boxed_clone();

        if let Some(retry) = config.retry {
            service = ServiceBuilder::new()
                .layer(RetryLayer::with_total_timeout(retry, config.total_timeout))
                .service(service)
                .boxed_clone();
        }

        if let Some(limit) = config.concurrency {
            service = apply_concurrency_limit(service, &limit);
        }

        let service: BufferedService = Buffer::new(service, config.buffer_capacity.max(1));

        Ok(HttpClient {
            service,
            max_body_size: config.max_body_size,
            transport_security: config.transport,
        })
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Waiting limit by default; with `shed_load` a saturated limit fails fast with `Overloaded`
fn apply_concurrency_limit(inner: InnerService, limit: &ConcurrencyConfig) -> InnerService {
    let max = limit.max_concurrent_requests.max(1);
    if limit.shed_load {
        ServiceBuilder::new()
            .layer(LoadShedLayer::new())
            .layer(ConcurrencyLimitLayer::new(max))
            .service(inner)
            .map_err(map_load_shed_error)
            .boxed_clone()
    } else {
        ServiceBuilder::new()
            .layer(ConcurrencyLimitLayer::new(max))
            .service(inner)
            .boxed_clone()
    }
}

/// Recover typed errors boxed by tower middleware; timeouts carry the configured duration
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

fn map_load_shed_error(err: tower::BoxError) -> HttpError {
    if err.is::<tower::load_shed::error::Overloaded>() {
        return HttpError::Overloaded;
    }
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

fn box_response_body<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, body.map_err(Into::into).boxed())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::DEFAULT_USER_AGENT;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct WarningCapture {
        warnings: Arc<Mutex<Vec<String>>>,
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarningCapture {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if *event.metadata().level() == tracing::Level::WARN {
                let mut visitor = MessageVisitor(String::new());
                event.record(&mut visitor);
                self.warnings.lock().unwrap().push(visitor.0);
            }
        }
    }

    struct MessageVisitor(String);

    impl tracing::field::Visit for MessageVisitor {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    fn warnings_during(build: impl FnOnce()) -> Vec<String> {
        let capture = WarningCapture::default();
        let warnings = capture.warnings.clone();
        let subscriber = tracing_subscriber::registry().with(capture);
        tracing::subscriber::with_default(subscriber, build);
        let captured = warnings.lock().unwrap().clone();
        captured
    }

    #[test]
    fn test_builder_defaults() {
        let builder = HttpClientBuilder::new();
        assert_eq!(builder.config.request_timeout, Duration::from_secs(30));
        assert_eq!(builder.config.user_agent, DEFAULT_USER_AGENT);
        assert!(builder.config.retry.is_some());
        assert_eq!(builder.config.buffer_capacity, 1024);
    }

    #[test]
    fn test_builder_setters() {
        let builder = HttpClientBuilder::new()
            .timeout(Duration::from_secs(5))
            .total_timeout(Duration::from_secs(20))
            .user_agent("dar/1")
            .retry(None)
            .concurrency(Some(ConcurrencyConfig::fail_fast(3)))
            .max_body_size(512)
            .buffer_capacity(0);

        assert_eq!(builder.config.request_timeout, Duration::from_secs(5));
        assert_eq!(builder.config.total_timeout, Some(Duration::from_secs(20)));
        assert_eq!(builder.config.user_agent, "dar/1");
        assert!(builder.config.retry.is_none());
        assert!(builder.config.concurrency.is_some_and(|c| c.shed_load));
        assert_eq!(builder.config.max_body_size, 512);
        assert_eq!(builder.config.buffer_capacity, 1);
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_user_agent() {
        let result = HttpClientBuilder::new().user_agent("bad\nagent").build();
        assert!(matches!(result, Err(HttpError::InvalidHeaderValue(_))));
    }

    #[test]
    fn test_build_outside_runtime_is_an_error() {
        let result = HttpClientBuilder::new().build();
        assert!(matches!(result, Err(HttpError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_build_with_every_layer() {
        let client = HttpClientBuilder::with_config(HttpClientConfig::default())
            .total_timeout(Duration::from_secs(60))
            .concurrency(Some(ConcurrencyConfig::fail_fast(4)))
            .build();
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_insecure_http_warns() {
        let warnings = warnings_during(|| {
            _ = HttpClientBuilder::new().allow_insecure_http().build();
        });
        assert!(
            warnings.iter().any(|w| w.contains("insecure HTTP")),
            "expected insecure HTTP warning, got: {warnings:?}"
        );
    }

    #[tokio::test]
    async fn test_tls_only_does_not_warn() {
        let warnings = warnings_during(|| {
            _ = HttpClientBuilder::new()
                .transport(TransportSecurity::TlsOnly)
                .build();
        });
        assert!(
            !warnings.iter().any(|w| w.contains("insecure HTTP")),
            "unexpected warning: {warnings:?}"
        );
    }

    #[test]
    fn test_map_tower_error_unwraps_http_error() {
        let err = map_tower_error(Box::new(HttpError::Overloaded), Duration::from_secs(1));
        assert!(matches!(err, HttpError::Overloaded));
    }

    #[test]
    fn test_map_tower_error_timeout_carries_duration() {
        let err = map_tower_error(
            Box::new(tower::timeout::error::Elapsed::new()),
            Duration::from_secs(7),
        );
        assert!(matches!(err, HttpError::Timeout(d) if d == Duration::from_secs(7)));
    }

    #[test]
    fn test_map_load_shed_error() {
        let err = map_load_shed_error(Box::new(tower::load_shed::error::Overloaded::new()));
        assert!(matches!(err, HttpError::Overloaded));

        let err = map_load_shed_error("boom".into());
        assert!(matches!(err, HttpError::Transport(_)));
    }
}
