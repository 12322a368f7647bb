//! Error types for the DAR client.

use crate::category::AddressCategory;
use crate::transport::TransportError;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by [`DarClient`](crate::DarClient) operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DarError {
    /// A network operation ran without an open session.
    #[error("session not open; call open() first")]
    SessionNotOpen,

    /// Configuration rejected before any request was made.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The identifier was not found in any searched category.
    #[error("address {id} not found in [{}]", join_categories(.categories))]
    NotFound {
        id: Uuid,
        categories: Vec<AddressCategory>,
    },

    /// A request failed outside the batch path.
    #[error(transparent)]
    Transport(TransportError),

    /// A chunk of a batch lookup failed, which fails the whole category.
    #[error("batch lookup in '{category}' failed: {source}")]
    BatchFetch {
        category: AddressCategory,
        #[source]
        source: TransportError,
    },

    /// The blocking client could not start its runtime.
    #[error("failed to start blocking runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// DAR answered with a body that is not the expected JSON shape.
    #[error("malformed reply from '{path}': {reason}")]
    MalformedReply { path: String, reason: String },
}

impl DarError {
    /// Whether this error lets a single-identifier lookup move on to the next category
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DarError::NotFound { .. })
    }
}

impl From<TransportError> for DarError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotOpen => DarError::SessionNotOpen,
            other => DarError::Transport(other),
        }
    }
}

fn join_categories(categories: &[AddressCategory]) -> String {
    categories
        .iter()
        .map(|c| c.path_segment())
        .collect::<Vec<_>>()
        .join(", ")
}
