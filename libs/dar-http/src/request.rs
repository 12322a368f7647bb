use crate::client::{BufferedService, map_buffer_error};
use crate::config::TransportSecurity;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::HttpResponse;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::Request;
use http_body_util::Full;
use std::time::Duration;
use tower::{Service, ServiceExt};

/// GET request builder
///
/// Created by [`HttpClient::get`](crate::HttpClient::get). Header errors are
/// deferred and reported by [`send`](Self::send).
///
/// ```ignore
/// let records: serde_json::Value = client
///     .get("https://api.dataforsyningen.dk/adresser")
///     .query(&[("id", ids.as_str()), ("struktur", "mini")])
///     .send()
///     .await?
///     .json()
///     .await?;
/// ```
#[must_use = "RequestBuilder does nothing until .send() is called"]
pub struct RequestBuilder {
    service: BufferedService,
    max_body_size: usize,
    url: String,
    query: Vec<(String, String)>,
    headers: Vec<(HeaderName, HeaderValue)>,
    timeout: Option<Duration>,
    error: Option<HttpError>,
    transport_security: TransportSecurity,
}

impl RequestBuilder {
    pub(crate) fn new(
        service: BufferedService,
        max_body_size: usize,
        url: String,
        transport_security: TransportSecurity,
    ) -> Self {
        Self {
            service,
            max_body_size,
            url,
            query: Vec::new(),
            headers: Vec::new(),
            timeout: None,
            error: None,
            transport_security,
        }
    }

    /// Add a header
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.headers.push((name, value)),
            (Err(e), _) => self.error = Some(HttpError::InvalidHeaderName(e)),
            (_, Err(e)) => self.error = Some(HttpError::InvalidHeaderValue(e)),
        }
        self
    }

    /// Append query pairs; they are URL-encoded when the request is sent
    pub fn query<K, V>(mut self, pairs: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.query.extend(
            pairs
                .iter()
                .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned())),
        );
        self
    }

    /// Bound this call (queueing, retries and response headers) by `timeout`.
    ///
    /// Expiry yields `HttpError::Timeout(timeout)`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn full_url(&self) -> Result<String, HttpError> {
        if self.query.is_empty() {
            return Ok(self.url.clone());
        }
        let encoded = serde_urlencoded::to_string(&self.query)?;
        let separator = if self.url.contains('?') { '&' } else { '?' };
        Ok(format!("{}{separator}{encoded}", self.url))
    }

    fn validate_url(&self, url: &str) -> Result<http::Uri, HttpError> {
        let uri: http::Uri = url.parse().map_err(|e: http::uri::InvalidUri| {
            HttpError::InvalidUri {
                url: url.to_owned(),
                kind: InvalidUriKind::ParseError,
                reason: e.to_string(),
            }
        })?;

        if uri.authority().is_none() {
            return Err(HttpError::InvalidUri {
                url: url.to_owned(),
                kind: InvalidUriKind::MissingAuthority,
                reason: "missing host/authority".to_owned(),
            });
        }

        match uri.scheme_str() {
            Some("https") => Ok(uri),
            Some("http") => match self.transport_security {
                TransportSecurity::AllowInsecureHttp => Ok(uri),
                TransportSecurity::TlsOnly => Err(HttpError::InvalidScheme {
                    scheme: "http".to_owned(),
                    reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
                }),
            },
            Some(scheme) => Err(HttpError::InvalidScheme {
                scheme: scheme.to_owned(),
                reason: "only http:// and https:// schemes are supported".to_owned(),
            }),
            None => Err(HttpError::InvalidUri {
                url: url.to_owned(),
                kind: InvalidUriKind::MissingScheme,
                reason: "missing scheme".to_owned(),
            }),
        }
    }

    /// Send the request
    ///
    /// Returns `Ok` for every HTTP status. Waits for a buffer slot when the
    /// client is saturated.
    ///
    /// # Errors
    ///
    /// Returns `HttpError` for invalid headers or URL, a scheme rejected by the
    /// transport security mode, transport failures, timeouts, and `Overloaded`
    /// when load shedding is enabled.
    pub async fn send(mut self) -> Result<HttpResponse, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        let url = self.full_url()?;
        let uri = self.validate_url(&url)?;

        let mut builder = Request::builder().method(http::Method::GET).uri(uri);
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        let request = builder.body(Full::new(Bytes::new()))?;

        let max_body_size = self.max_body_size;
        let mut service = self.service;
        let exchange = async move {
            let ready = service.ready().await.map_err(map_buffer_error)?;
            let inner = ready.call(request).await.map_err(map_buffer_error)?;
            Ok(HttpResponse {
                inner,
                max_body_size,
            })
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| HttpError::Timeout(limit))?,
            None => exchange.await,
        }
    }
}
