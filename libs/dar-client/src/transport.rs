//! HTTP GET capability used by the resolver, and its session-holding implementation.

use async_trait::async_trait;
use bytes::Bytes;
use dar_http::{HttpClient, HttpClientBuilder, HttpClientConfig, HttpError};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// A GET against a path under the DAR base URL
#[derive(Debug, Clone, Copy)]
pub struct GetRequest<'a> {
    pub path: &'a str,
    pub query: &'a [(&'a str, &'a str)],
    /// Bound on this call, on top of the per-attempt timeout
    pub timeout: Option<Duration>,
}

impl<'a> GetRequest<'a> {
    #[must_use]
    pub fn new(path: &'a str) -> Self {
        Self {
            path,
            query: &[],
            timeout: None,
        }
    }

    #[must_use]
    pub fn query(mut self, query: &'a [(&'a str, &'a str)]) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Failure of a single GET
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// No open session.
    #[error("transport session not open")]
    NotOpen,

    /// DAR answered 404.
    #[error("'{path}' not found")]
    NotFound { path: String },

    /// The call or one of its attempts timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Network failure or a non-2xx status other than 404.
    #[error(transparent)]
    Http(HttpError),
}

impl From<HttpError> for TransportError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Timeout(d) | HttpError::DeadlineExceeded(d) => TransportError::Timeout(d),
            other => TransportError::Http(other),
        }
    }
}

/// HTTP GET with an explicit session lifecycle.
///
/// Opening an open transport and closing a closed one are no-ops that log a
/// warning. `get` without an open session fails with `TransportError::NotOpen`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Create the session
    ///
    /// # Errors
    /// Returns an error when the underlying client cannot be built.
    fn open(&self) -> Result<(), TransportError>;

    fn close(&self);

    fn is_open(&self) -> bool;

    /// GET `request.path` and return the body of a 2xx reply
    ///
    /// # Errors
    /// `NotFound` on 404, `Timeout` on expiry, `Http` for every other failure.
    async fn get(&self, request: GetRequest<'_>) -> Result<Bytes, TransportError>;

    /// GET `request.path` and return the status code, whatever it is
    ///
    /// # Errors
    /// `NotOpen`, `Timeout` and `Http` as for [`get`](Self::get); never `NotFound`.
    async fn status(&self, request: GetRequest<'_>) -> Result<u16, TransportError>;
}

struct Session {
    client: HttpClient,
    generation: u64,
}

/// [`Transport`] over a pooled [`HttpClient`]
pub struct HttpTransport {
    base_url: Url,
    http_config: HttpClientConfig,
    session: RwLock<Option<Session>>,
    generations: AtomicU64,
}

impl HttpTransport {
    #[must_use]
    pub fn new(base_url: Url, http_config: HttpClientConfig) -> Self {
        Self {
            base_url,
            http_config,
            session: RwLock::new(None),
            generations: AtomicU64::new(0),
        }
    }

    /// Sequence number of the open session (1 for the first), `None` when closed
    #[must_use]
    pub fn session_generation(&self) -> Option<u64> {
        self.session.read().as_ref().map(|s| s.generation)
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn client(&self) -> Result<HttpClient, TransportError> {
        self.session
            .read()
            .as_ref()
            .map(|s| s.client.clone())
            .ok_or(TransportError::NotOpen)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("session_generation", &self.session_generation())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn open(&self) -> Result<(), TransportError> {
        let mut slot = self.session.write();
        if let Some(existing) = slot.as_ref() {
            tracing::warn!(
                generation = existing.generation,
                "open called with existing session"
            );
            return Ok(());
        }

        let client = HttpClientBuilder::with_config(self.http_config.clone()).build()?;
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        *slot = Some(Session { client, generation });
        tracing::debug!(generation, base_url = %self.base_url, "session opened");
        Ok(())
    }

    fn close(&self) {
        match self.session.write().take() {
            Some(session) => {
                tracing::debug!(generation = session.generation, "session closed");
            }
            None => tracing::warn!("close called without session"),
        }
    }

    fn is_open(&self) -> bool {
        self.session.read().is_some()
    }

    async fn get(&self, request: GetRequest<'_>) -> Result<Bytes, TransportError> {
        let client = self.client()?;
        let url = self.url_for(request.path);
        let started = Instant::now();

        let mut builder = client.get(&url).query(request.query);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().await?;
        let status = response.status();

        tracing::debug!(
            path = request.path,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis(),
            "DAR request completed"
        );

        if status.as_u16() == 404 {
            return Err(TransportError::NotFound {
                path: request.path.to_owned(),
            });
        }
        Ok(response.checked_bytes().await?)
    }

    async fn status(&self, request: GetRequest<'_>) -> Result<u16, TransportError> {
        let client = self.client()?;
        let mut builder = client.get(&self.url_for(request.path)).query(request.query);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        let status = builder.send().await?.status().as_u16();
        tracing::debug!(path = request.path, status, "DAR status request completed");
        Ok(status)
    }
}
