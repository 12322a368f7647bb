use crate::model::AddressRecord;
use async_trait::async_trait;
use uuid::Uuid;

/// Observer notified once per identifier a lookup resolved.
///
/// Runs after the result is complete and cannot change it. Intended for
/// caching layers; the default does nothing.
#[async_trait]
pub trait ResolutionHook: Send + Sync {
    async fn address_resolved(&self, id: Uuid, record: &AddressRecord);
}

/// Hook that ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

#[async_trait]
impl ResolutionHook for NoopHook {
    async fn address_resolved(&self, _id: Uuid, _record: &AddressRecord) {}
}
