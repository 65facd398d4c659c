use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::EventBusConfig;
use crate::error::EventBusError;
use crate::event::Topic;
use crate::handler::EventHandler;

type SubscriptionId = u64;

/// Per-entity-kind event bus: one instance backs the Join/Remove pair for
/// members, job-configs, job-records, or tasks. Subscribers fire in
/// subscription order; a handler that errors or times out is logged and
/// does not block the remaining subscribers for that topic.
pub struct EventBus<T> {
    config: EventBusConfig,
    handlers: Arc<RwLock<HashMap<Topic, Vec<(SubscriptionId, Arc<dyn EventHandler<T>>)>>>>,
    next_id: Arc<RwLock<SubscriptionId>>,
}

impl<T> EventBus<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(RwLock::new(0)),
        }
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    /// Subscribes `handler` to `topic`. Dropping the returned
    /// `EventSubscription` unsubscribes it.
    pub async fn subscribe(
        &self,
        topic: Topic,
        handler: Arc<dyn EventHandler<T>>,
    ) -> EventSubscription<T> {
        let mut next_id = self.next_id.write().await;
        let id = *next_id;
        *next_id += 1;

        let mut handlers = self.handlers.write().await;
        handlers.entry(topic).or_default().push((id, handler));

        EventSubscription {
            id,
            topic,
            handlers: self.handlers.clone(),
        }
    }

    /// Fire-and-forget dispatch to every subscriber of `topic`, in
    /// subscription order. A single subscriber's failure or timeout is
    /// logged and does not prevent the rest from running — one wedged
    /// subscriber must not stall the whole reconcile pass, only itself.
    pub async fn publish(&self, topic: Topic, payload: T) {
        let handlers = self.handlers.read().await;
        let Some(subscribers) = handlers.get(&topic) else {
            return;
        };
        let timeout = self.config.get_handler_timeout();
        for (_, handler) in subscribers {
            let handler = handler.clone();
            let payload = payload.clone();
            match tokio::time::timeout(timeout, handler.handle(payload)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(topic = topic.as_str(), error = %e, "event handler failed");
                }
                Err(_) => {
                    tracing::warn!(
                        topic = topic.as_str(),
                        timeout_ms = timeout.as_millis() as u64,
                        "event handler timed out"
                    );
                }
            }
        }
    }
}

/// A live subscription. Unsubscribes automatically when dropped, or
/// immediately via `unsubscribe()`.
pub struct EventSubscription<T> {
    id: SubscriptionId,
    topic: Topic,
    handlers: Arc<RwLock<HashMap<Topic, Vec<(SubscriptionId, Arc<dyn EventHandler<T>>)>>>>,
}

impl<T> EventSubscription<T>
where
    T: Send + Sync + 'static,
{
    pub async fn unsubscribe(self) {
        self.remove().await;
    }

    async fn remove(&self) {
        let mut handlers = self.handlers.write().await;
        if let Some(entries) = handlers.get_mut(&self.topic) {
            entries.retain(|(id, _)| *id != self.id);
            if entries.is_empty() {
                handlers.remove(&self.topic);
            }
        }
    }
}

impl<T> Drop for EventSubscription<T> {
    fn drop(&mut self) {
        let handlers = self.handlers.clone();
        let topic = self.topic;
        let id = self.id;
        tokio::spawn(async move {
            let mut handlers = handlers.write().await;
            if let Some(entries) = handlers.get_mut(&topic) {
                entries.retain(|(sub_id, _)| *sub_id != id);
                if entries.is_empty() {
                    handlers.remove(&topic);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl EventHandler<String> for CountingHandler {
        async fn handle(&self, _event: String) -> Result<(), EventBusError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn subscribe_and_publish() {
        let bus: EventBus<String> = EventBus::new(EventBusConfig::new());
        let count = Arc::new(AtomicUsize::new(0));
        let _sub = bus
            .subscribe(Topic::Join, Arc::new(CountingHandler { count: count.clone() }))
            .await;

        bus.publish(Topic::Join, "m1".to_string()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn publish_on_different_topic_does_not_fire() {
        let bus: EventBus<String> = EventBus::new(EventBusConfig::new());
        let count = Arc::new(AtomicUsize::new(0));
        let _sub = bus
            .subscribe(Topic::Join, Arc::new(CountingHandler { count: count.clone() }))
            .await;

        bus.publish(Topic::Remove, "m1".to_string()).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsubscribe_stops_dispatch() {
        let bus: EventBus<String> = EventBus::new(EventBusConfig::new());
        let count = Arc::new(AtomicUsize::new(0));
        let sub = bus
            .subscribe(Topic::Join, Arc::new(CountingHandler { count: count.clone() }))
            .await;
        sub.unsubscribe().await;

        bus.publish(Topic::Join, "m1".to_string()).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dropping_subscription_eventually_unsubscribes() {
        let bus: EventBus<String> = EventBus::new(EventBusConfig::new());
        let count = Arc::new(AtomicUsize::new(0));
        {
            let _sub = bus
                .subscribe(Topic::Join, Arc::new(CountingHandler { count: count.clone() }))
                .await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        bus.publish(Topic::Join, "m1".to_string()).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    struct SlowHandler;

    #[async_trait::async_trait]
    impl EventHandler<String> for SlowHandler {
        async fn handle(&self, _event: String) -> Result<(), EventBusError> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn slow_handler_times_out_without_panicking() {
        let config = EventBusConfig::new().handler_timeout(Duration::from_millis(20));
        let bus: EventBus<String> = EventBus::new(config);
        let _sub = bus.subscribe(Topic::Join, Arc::new(SlowHandler)).await;

        // Should return promptly, not hang for a second.
        bus.publish(Topic::Join, "m1".to_string()).await;
    }

    #[tokio::test]
    async fn multiple_subscribers_all_fire() {
        let bus: EventBus<String> = EventBus::new(EventBusConfig::new());
        let c1 = Arc::new(AtomicUsize::new(0));
        let c2 = Arc::new(AtomicUsize::new(0));
        let _s1 = bus.subscribe(Topic::Join, Arc::new(CountingHandler { count: c1.clone() })).await;
        let _s2 = bus.subscribe(Topic::Join, Arc::new(CountingHandler { count: c2.clone() })).await;

        bus.publish(Topic::Join, "m1".to_string()).await;
        assert_eq!(c1.load(Ordering::SeqCst), 1);
        assert_eq!(c2.load(Ordering::SeqCst), 1);
    }
}
