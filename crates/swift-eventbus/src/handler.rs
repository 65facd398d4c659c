use async_trait::async_trait;

use crate::error::EventBusError;

/// A subscriber to one topic of one entity kind's `EventBus<T>`.
///
/// Implementations must not block: `EventBus::publish` wraps every call in
/// a timeout, so a handler that never yields is logged and skipped rather
/// than wedging the reconciler forever, but it still burns the full
/// timeout doing so.
#[async_trait]
pub trait EventHandler<T>: Send + Sync
where
    T: Send + 'static,
{
    async fn handle(&self, event: T) -> Result<(), EventBusError>;
}
