#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Address lookups against the Danish Address Register (DAR).
//!
//! [`DarClient`] resolves address UUIDs by issuing batched, chunked lookups and
//! retrying the identifiers one category did not know against the next
//! category, in the order of [`AddressCategory::ALL`]. Callers without an async
//! runtime use [`blocking::DarClient`].

pub mod blocking;
mod category;
mod chunk;
mod client;
mod config;
mod error;
mod hook;
mod model;
mod transport;

pub use category::{AddressCategory, CategorySelection, UnknownCategory};
pub use client::{DarClient, HEALTH_PATH, LookupOptions};
pub use config::{
    DEFAULT_BASE_URL, DEFAULT_CHUNK_SIZE, DEFAULT_USER_AGENT, DarClientConfig, RetryPolicy,
};
pub use error::DarError;
pub use hook::{NoopHook, ResolutionHook};
pub use model::{AddressRecord, Resolution};
pub use transport::{GetRequest, HttpTransport, Transport, TransportError};
