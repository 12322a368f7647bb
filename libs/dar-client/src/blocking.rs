//! Synchronous wrapper around [`crate::DarClient`].
//!
//! Owns a current-thread Tokio runtime and drives every call to completion on
//! it. Do not use it from inside an async context; the async client is the
//! right tool there.

use crate::category::{AddressCategory, CategorySelection};
use crate::client::LookupOptions;
use crate::config::DarClientConfig;
use crate::error::DarError;
use crate::model::{AddressRecord, Resolution};
use std::collections::HashSet;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use uuid::Uuid;

/// Blocking DAR client.
///
/// ```ignore
/// let client = dar_client::blocking::DarClient::new(DarClientConfig::default())?;
/// client.open()?;
/// let record = client.resolve_one(id, &CategorySelection::Default)?;
/// client.close();
/// ```
#[derive(Debug)]
pub struct DarClient {
    // Dropped before the runtime it was opened on.
    inner: crate::DarClient,
    runtime: Runtime,
}

impl DarClient {
    /// Blocking client talking HTTP to `config.base_url`
    ///
    /// # Errors
    /// `DarError::InvalidConfig` if the configuration does not validate,
    /// `DarError::Runtime` if the runtime cannot be started.
    pub fn new(config: DarClientConfig) -> Result<Self, DarError> {
        Self::from_async(crate::DarClient::new(config)?)
    }

    /// Wrap an existing async client
    ///
    /// # Errors
    /// `DarError::Runtime` if the runtime cannot be started.
    pub fn from_async(inner: crate::DarClient) -> Result<Self, DarError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(DarError::Runtime)?;
        Ok(Self { inner, runtime })
    }

    #[must_use]
    pub fn config(&self) -> &DarClientConfig {
        self.inner.config()
    }

    /// Open the session on the owned runtime; warns if already open.
    ///
    /// # Errors
    /// Returns an error when the HTTP client cannot be built.
    pub fn open(&self) -> Result<(), DarError> {
        let _guard = self.runtime.enter();
        self.inner.open()
    }

    /// Close the session; warns if not open.
    pub fn close(&self) {
        self.inner.close();
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    /// See [`crate::DarClient::health_check`].
    ///
    /// # Errors
    /// `DarError::SessionNotOpen` without an open session.
    pub fn health_check(&self, timeout: Duration) -> Result<bool, DarError> {
        self.runtime.block_on(self.inner.health_check(timeout))
    }

    /// See [`crate::DarClient::fetch_one`].
    ///
    /// # Errors
    /// As for the async client.
    pub fn fetch_one(
        &self,
        id: Uuid,
        category: AddressCategory,
    ) -> Result<AddressRecord, DarError> {
        self.runtime.block_on(self.inner.fetch_one(id, category))
    }

    /// See [`crate::DarClient::fetch_category`].
    ///
    /// # Errors
    /// As for the async client.
    pub fn fetch_category(
        &self,
        ids: &HashSet<Uuid>,
        category: AddressCategory,
        chunk_size: Option<usize>,
    ) -> Result<Resolution, DarError> {
        self.runtime
            .block_on(self.inner.fetch_category(ids, category, chunk_size))
    }

    /// See [`crate::DarClient::resolve_many`].
    ///
    /// # Errors
    /// As for the async client.
    pub fn resolve_many(
        &self,
        ids: &HashSet<Uuid>,
        options: &LookupOptions,
    ) -> Result<Resolution, DarError> {
        self.runtime.block_on(self.inner.resolve_many(ids, options))
    }

    /// See [`crate::DarClient::resolve_one`].
    ///
    /// # Errors
    /// As for the async client.
    pub fn resolve_one(
        &self,
        id: Uuid,
        categories: &CategorySelection,
    ) -> Result<AddressRecord, DarError> {
        self.runtime.block_on(self.inner.resolve_one(id, categories))
    }
}
