use std::sync::Arc;
use std::time::Duration;

use swift_kv::ServiceRegistry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClusterConfig;

const HEARTBEAT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Keeps the local member's service-registry TTL alive for as long as the
/// process runs. Call `init` once at startup; the returned handle and
/// cancellation token let the caller stop the loop cleanly on shutdown.
pub struct HealthHeartbeat {
    registry: Arc<dyn ServiceRegistry>,
    local_id: String,
    local_address: String,
    config: ClusterConfig,
    cancel: CancellationToken,
}

impl HealthHeartbeat {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        local_id: String,
        local_address: String,
        config: ClusterConfig,
    ) -> Self {
        Self {
            registry,
            local_id,
            local_address,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Registers the local service with its configured TTL, then spawns
    /// the background `PassTTL` loop. The returned handle resolves once
    /// `stop` is called.
    pub async fn init(&self) -> Result<JoinHandle<()>, swift_kv::KvError> {
        self.registry
            .register_service(&self.local_id, &self.local_address, self.config.member_ttl())
            .await?;

        let registry = self.registry.clone();
        let local_id = self.local_id.clone();
        let period = self.config.heartbeat_period();
        let token = self.cancel.clone();

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(period) => {
                        if let Err(e) = registry.pass_ttl(&local_id).await {
                            tracing::warn!(member = %local_id, error = %e, "heartbeat pass_ttl failed");
                            tokio::select! {
                                _ = token.cancelled() => break,
                                _ = tokio::time::sleep(HEARTBEAT_RETRY_BACKOFF) => {}
                            }
                        }
                    }
                }
            }
        }))
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}
