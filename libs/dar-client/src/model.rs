use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// One DAR address object, passed through unchanged.
///
/// Only the `id` field is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressRecord(Map<String, Value>);

impl AddressRecord {
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// The record's `id`, if present and a valid UUID
    #[must_use]
    pub fn id(&self) -> Option<Uuid> {
        self.get_str("id").and_then(|s| Uuid::parse_str(s).ok())
    }

    /// A string field, if present
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for AddressRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Outcome of a multi-identifier lookup.
///
/// `found` and `missing` are disjoint. Once a lookup completes they partition
/// the requested identifiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Resolution {
    pub found: HashMap<Uuid, AddressRecord>,
    pub missing: HashSet<Uuid>,
}

impl Resolution {
    /// Every identifier missing, nothing found
    #[must_use]
    pub fn all_missing(ids: HashSet<Uuid>) -> Self {
        Self {
            found: HashMap::new(),
            missing: ids,
        }
    }

    /// Fold in the result of another chunk of the same category.
    ///
    /// Chunks cover disjoint identifiers, so keys never collide.
    pub fn absorb(&mut self, other: Resolution) {
        self.found.extend(other.found);
        self.missing.extend(other.missing);
    }

    /// Number of identifiers accounted for
    #[must_use]
    pub fn len(&self) -> usize {
        self.found.len() + self.missing.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.found.is_empty() && self.missing.is_empty()
    }
}
