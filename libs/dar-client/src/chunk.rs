//! Splitting identifier sets into batch requests and reconciling batch replies.

use crate::model::{AddressRecord, Resolution};
use std::collections::HashSet;
use uuid::Uuid;

/// Partition `ids` into chunks of at most `size` (`size` must be non-zero).
///
/// Chunk order and membership order are unspecified.
pub(crate) fn split(ids: &HashSet<Uuid>, size: usize) -> Vec<Vec<Uuid>> {
    let ids: Vec<Uuid> = ids.iter().copied().collect();
    ids.chunks(size.max(1)).map(<[Uuid]>::to_vec).collect()
}

/// Value of the `id` query parameter for a batch lookup: `a|b|c`
pub(crate) fn id_param(chunk: &[Uuid]) -> String {
    chunk
        .iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join("|")
}

/// Match a batch reply against the identifiers that were asked for.
///
/// Records keyed by anything outside `chunk` are dropped, as are records
/// without a usable `id`.
pub(crate) fn reconcile(chunk: &[Uuid], records: Vec<AddressRecord>) -> Resolution {
    let requested: HashSet<Uuid> = chunk.iter().copied().collect();
    let mut resolution = Resolution::default();

    for record in records {
        match record.id() {
            Some(id) if requested.contains(&id) => {
                resolution.found.insert(id, record);
            }
            Some(id) => tracing::debug!(%id, "ignoring unrequested record in batch reply"),
            None => tracing::debug!("ignoring batch record without a valid id"),
        }
    }

    resolution.missing = requested
        .into_iter()
        .filter(|id| !resolution.found.contains_key(id))
        .collect();
    resolution
}
