#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Read-only HTTP client for the DAR address service
//!
//! A hyper client over rustls with a tower middleware stack:
//! - HTTPS only unless insecure HTTP is explicitly allowed
//! - Pooled connections with a bounded number of in-flight requests;
//!   excess requests wait unless load shedding is enabled
//! - Retries with exponential backoff for idempotent requests, honouring `Retry-After`
//! - Per-attempt timeout, optional deadline across retries, optional per-call timeout
//! - User-Agent injection and transparent gzip/brotli/deflate decompression
//!
//! ```ignore
//! use dar_http::HttpClient;
//!
//! let client = HttpClient::builder()
//!     .user_agent("dar-lookup/0.2")
//!     .build()?;
//!
//! let records: serde_json::Value = client
//!     .get("https://api.dataforsyningen.dk/adresser")
//!     .query(&[("id", ids.as_str()), ("struktur", "mini"), ("noformat", "1")])
//!     .send()
//!     .await?
//!     .json()
//!     .await?;
//! ```

mod builder;
mod client;
mod config;
mod error;
mod layers;
mod request;
mod response;
mod tls;

pub use builder::HttpClientBuilder;
pub use client::HttpClient;
pub use config::{
    ConcurrencyConfig, DEFAULT_USER_AGENT, ExponentialBackoff, HttpClientConfig, RetryConfig,
    RetryTrigger, TlsRootConfig, TransportSecurity, is_idempotent_method,
};
pub use error::{HttpError, InvalidUriKind};
pub use layers::{
    RETRY_ATTEMPT_HEADER, RetryLayer, RetryService, UserAgentLayer, UserAgentService,
    calculate_backoff,
};
pub use request::RequestBuilder;
pub use response::{ERROR_BODY_PREVIEW_LIMIT, HttpResponse, ResponseBody, parse_retry_after};
