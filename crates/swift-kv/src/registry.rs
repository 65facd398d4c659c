use async_trait::async_trait;
use std::time::Duration;

use crate::error::KvError;

/// Façade over the KV's health/TTL subsystem.
///
/// `check_health` must reflect the most recent `pass_ttl` call within one
/// TTL window; the member registry's reconcile loop (§4.2) depends on that
/// freshness bound to decide whether a member just went offline.
#[async_trait]
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait ServiceRegistry: Send + Sync {
    async fn register_service(&self, id: &str, address: &str, ttl: Duration) -> Result<(), KvError>;

    /// Resets the TTL clock for `id`. Called at least once per TTL/1.5
    /// window by the health heartbeat (§4.3).
    async fn pass_ttl(&self, id: &str) -> Result<(), KvError>;

    async fn check_health(&self, id: &str) -> Result<bool, KvError>;
}
