use crate::category::{AddressCategory, CategorySelection};
use crate::chunk;
use crate::config::DarClientConfig;
use crate::error::DarError;
use crate::hook::{NoopHook, ResolutionHook};
use crate::model::{AddressRecord, Resolution};
use crate::transport::{GetRequest, HttpTransport, Transport, TransportError};
use dar_http::HttpError;
use futures::future::{join_all, try_join_all};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Path requested by [`DarClient::health_check`]
pub const HEALTH_PATH: &str = "autocomplete";

/// Query parameters sent with every lookup: compact records, no pretty-printing
const LOOKUP_PARAMS: [(&str, &str); 2] = [("struktur", "mini"), ("noformat", "1")];

/// Options for [`DarClient::resolve_many`]
#[derive(Debug, Clone, Default)]
pub struct LookupOptions {
    pub categories: CategorySelection,
    /// Overrides the configured chunk size
    pub chunk_size: Option<usize>,
}

impl LookupOptions {
    #[must_use]
    pub fn categories(mut self, categories: impl Into<CategorySelection>) -> Self {
        self.categories = categories.into();
        self
    }

    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }
}

/// Client for DAR address lookups.
///
/// Call [`open`](Self::open) before any lookup and [`close`](Self::close) when
/// done. Lookups take `&self` and may run concurrently; they share one
/// connection pool bounded by `max_connections`.
///
/// ```ignore
/// let client = DarClient::new(DarClientConfig::default())?;
/// client.open()?;
/// let resolution = client.resolve_many(&ids, &LookupOptions::default()).await?;
/// client.close();
/// ```
pub struct DarClient {
    transport: Arc<dyn Transport>,
    config: DarClientConfig,
    hook: Arc<dyn ResolutionHook>,
}

impl std::fmt::Debug for DarClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DarClient")
            .field("config", &self.config)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl DarClient {
    /// Client talking HTTP to `config.base_url`
    ///
    /// # Errors
    /// Returns `DarError::InvalidConfig` if the configuration does not validate.
    pub fn new(config: DarClientConfig) -> Result<Self, DarError> {
        let base_url = config.validate()?;
        let transport = HttpTransport::new(base_url, config.http_config());
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Client over any [`Transport`]. The configuration is not validated.
    #[must_use]
    pub fn with_transport(config: DarClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config,
            hook: Arc::new(NoopHook),
        }
    }

    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn ResolutionHook>) -> Self {
        self.hook = hook;
        self
    }

    #[must_use]
    pub fn config(&self) -> &DarClientConfig {
        &self.config
    }

    /// Open the connection pool; warns and keeps the pool if already open.
    ///
    /// Must be called from within a Tokio runtime; use
    /// [`blocking::DarClient`](crate::blocking::DarClient) from synchronous code.
    ///
    /// # Errors
    /// `DarError::InvalidConfig` outside a Tokio runtime, or another error when
    /// the HTTP client cannot be built.
    pub fn open(&self) -> Result<(), DarError> {
        self.transport.open().map_err(|err| match err {
            TransportError::Http(HttpError::NoRuntime) => DarError::InvalidConfig(
                "open() must run inside a Tokio runtime; use blocking::DarClient otherwise"
                    .to_owned(),
            ),
            other => other.into(),
        })
    }

    /// Close the connection pool; warns if not open.
    pub fn close(&self) {
        self.transport.close();
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Check DAR reachability.
    ///
    /// `Ok(true)` when DAR answers 200 within `timeout`; `Ok(false)` on any
    /// other status, network failures and timeouts.
    ///
    /// # Errors
    /// Returns `DarError::SessionNotOpen` without an open session.
    pub async fn health_check(&self, timeout: Duration) -> Result<bool, DarError> {
        let request = GetRequest::new(HEALTH_PATH).timeout(timeout);
        match self.transport.status(request).await {
            Ok(200) => Ok(true),
            Ok(status) => {
                tracing::debug!(status, "DAR health check got unexpected status");
                Ok(false)
            }
            Err(TransportError::NotOpen) => Err(DarError::SessionNotOpen),
            Err(err) => {
                tracing::debug!(error = %err, "DAR health check failed");
                Ok(false)
            }
        }
    }

    /// Fetch one identifier from one category.
    ///
    /// # Errors
    /// `DarError::NotFound` when DAR answers 404, `DarError::Transport` for
    /// other failures, `DarError::MalformedReply` for a non-object body.
    pub async fn fetch_one(
        &self,
        id: Uuid,
        category: AddressCategory,
    ) -> Result<AddressRecord, DarError> {
        let path = format!("{}/{id}", category.path_segment());
        let body = match self
            .transport
            .get(GetRequest::new(&path).query(&LOOKUP_PARAMS))
            .await
        {
            Ok(body) => body,
            Err(TransportError::NotFound { .. }) => {
                return Err(DarError::NotFound {
                    id,
                    categories: vec![category],
                });
            }
            Err(err) => return Err(err.into()),
        };

        serde_json::from_slice(&body).map_err(|e| DarError::MalformedReply {
            path,
            reason: e.to_string(),
        })
    }

    /// Fetch a set of identifiers from one category in parallel chunks.
    ///
    /// `chunk_size` falls back to the configured size. Every chunk must succeed.
    ///
    /// # Errors
    /// `DarError::InvalidConfig` for a zero chunk size, `DarError::BatchFetch`
    /// when any chunk fails.
    pub async fn fetch_category(
        &self,
        ids: &HashSet<Uuid>,
        category: AddressCategory,
        chunk_size: Option<usize>,
    ) -> Result<Resolution, DarError> {
        let chunk_size = self.effective_chunk_size(chunk_size)?;
        if ids.is_empty() {
            return Ok(Resolution::default());
        }

        let started = Instant::now();
        let chunks = chunk::split(ids, chunk_size);
        let replies =
            try_join_all(chunks.iter().map(|c| self.fetch_chunk(category, c))).await?;

        let mut resolution = Resolution::default();
        for reply in replies {
            resolution.absorb(reply);
        }

        tracing::debug!(
            category = %category,
            chunks = chunks.len(),
            ids = ids.len(),
            found = resolution.found.len(),
            missing = resolution.missing.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "category lookup finished"
        );
        Ok(resolution)
    }

    async fn fetch_chunk(
        &self,
        category: AddressCategory,
        chunk: &[Uuid],
    ) -> Result<Resolution, DarError> {
        let id_param = chunk::id_param(chunk);
        let query = [
            ("id", id_param.as_str()),
            LOOKUP_PARAMS[0],
            LOOKUP_PARAMS[1],
        ];
        let path = category.path_segment();

        let body = self
            .transport
            .get(GetRequest::new(path).query(&query))
            .await
            .map_err(|err| match err {
                TransportError::NotOpen => DarError::SessionNotOpen,
                source => DarError::BatchFetch { category, source },
            })?;

        let records = serde_json::from_slice(&body).map_err(|e| DarError::MalformedReply {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(chunk::reconcile(chunk, records))
    }

    /// Resolve a set of identifiers, falling back category by category.
    ///
    /// Only identifiers missing from one category are looked up in the next,
    /// and the search stops as soon as nothing is missing. The hook is then
    /// notified for every resolved identifier.
    ///
    /// # Errors
    /// Any category failure aborts the lookup; see [`fetch_category`](Self::fetch_category).
    pub async fn resolve_many(
        &self,
        ids: &HashSet<Uuid>,
        options: &LookupOptions,
    ) -> Result<Resolution, DarError> {
        self.effective_chunk_size(options.chunk_size)?;

        let mut found: HashMap<Uuid, AddressRecord> = HashMap::new();
        let mut remaining = ids.clone();

        for &category in options.categories.categories() {
            if remaining.is_empty() {
                break;
            }
            let step = self
                .fetch_category(&remaining, category, options.chunk_size)
                .await?;
            for (id, record) in step.found {
                found.entry(id).or_insert(record);
            }
            remaining = step.missing;
        }

        tracing::debug!(
            ids = ids.len(),
            found = found.len(),
            missing = remaining.len(),
            "resolve finished"
        );

        let resolution = Resolution {
            found,
            missing: remaining,
        };
        self.notify(&resolution.found).await;
        Ok(resolution)
    }

    /// Resolve one identifier, trying each selected category in order.
    ///
    /// # Errors
    /// `DarError::NotFound` naming every searched category when none has the
    /// identifier; any other error aborts the search immediately.
    pub async fn resolve_one(
        &self,
        id: Uuid,
        categories: &CategorySelection,
    ) -> Result<AddressRecord, DarError> {
        let categories = categories.categories();
        for &category in categories {
            match self.fetch_one(id, category).await {
                Ok(record) => {
                    self.hook.address_resolved(id, &record).await;
                    return Ok(record);
                }
                Err(err) if err.is_not_found() => {
                    tracing::debug!(%id, category = %category, "not found, trying next category");
                }
                Err(err) => return Err(err),
            }
        }

        Err(DarError::NotFound {
            id,
            categories: categories.to_vec(),
        })
    }

    async fn notify(&self, found: &HashMap<Uuid, AddressRecord>) {
        join_all(
            found
                .iter()
                .map(|(id, record)| self.hook.address_resolved(*id, record)),
        )
        .await;
    }

    fn effective_chunk_size(&self, requested: Option<usize>) -> Result<usize, DarError> {
        match requested.unwrap_or(self.config.chunk_size) {
            0 => Err(DarError::InvalidConfig(
                "chunk size must be at least 1".to_owned(),
            )),
            size => Ok(size),
        }
    }
}
