use std::time::Duration;

/// Per-bus tuning. This crate only needs the handler timeout, since
/// dispatch is synchronous fire-and-forget with no bounded channel.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    handler_timeout: Duration,
}

impl EventBusConfig {
    /// Default handler timeout: 5s. Generous relative to a reconcile
    /// tick's own period (the fastest reconciler ticks every 10s) so a
    /// well-behaved subscriber is never the one penalized.
    pub fn new() -> Self {
        Self {
            handler_timeout: Duration::from_secs(5),
        }
    }

    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn get_handler_timeout(&self) -> Duration {
        self.handler_timeout
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self::new()
    }
}
