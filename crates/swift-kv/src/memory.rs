use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::KvError;
use crate::kv::{KvStore, StoredValue};
use crate::registry::ServiceRegistry;

struct Entry {
    value: String,
    modify_index: u64,
}

/// In-memory `KvStore` backing tests and the library's own doctests. Not a
/// substitute for a real consistent store in production: it has no
/// durability and no cross-process visibility, but it honors the same CAS
/// contract real adapters must.
#[derive(Default)]
pub struct InMemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, KvError> {
        let entries = self.entries.lock().await;
        Ok(entries.get(key).map(|e| StoredValue {
            value: e.value.clone(),
            modify_index: e.modify_index,
        }))
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let entries = self.entries.lock().await;
        let mut matched: Vec<String> = entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        matched.sort();
        Ok(matched)
    }

    async fn create(&self, key: &str) -> Result<StoredValue, KvError> {
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.get(key) {
            return Ok(StoredValue {
                value: existing.value.clone(),
                modify_index: existing.modify_index,
            });
        }
        let entry = Entry {
            value: String::new(),
            modify_index: 1,
        };
        let stored = StoredValue {
            value: entry.value.clone(),
            modify_index: entry.modify_index,
        };
        entries.insert(key.to_string(), entry);
        Ok(stored)
    }

    async fn cas(&self, key: &str, value: String, expected_index: u64) -> Result<bool, KvError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(existing) if existing.modify_index == expected_index => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value,
                        modify_index: expected_index + 1,
                    },
                );
                Ok(true)
            }
            Some(_) => Ok(false),
            None if expected_index == 0 => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value,
                        modify_index: 1,
                    },
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_tree(&self, prefix: &str) -> Result<bool, KvError> {
        let mut entries = self.entries.lock().await;
        let to_remove: Vec<String> = entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        if to_remove.is_empty() {
            return Ok(false);
        }
        for key in to_remove {
            entries.remove(&key);
        }
        Ok(true)
    }
}

struct Registration {
    ttl: Duration,
    expires_at: Instant,
}

/// In-memory `ServiceRegistry`. Health reflects whether `pass_ttl` has been
/// called within the registered TTL window, same as
/// `InMemoryDistributedLock`'s expiry check for lock entries.
#[derive(Default)]
pub struct InMemoryServiceRegistry {
    services: Mutex<HashMap<String, Registration>>,
}

impl InMemoryServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceRegistry for InMemoryServiceRegistry {
    async fn register_service(&self, id: &str, _address: &str, ttl: Duration) -> Result<(), KvError> {
        let mut services = self.services.lock().await;
        services.insert(
            id.to_string(),
            Registration {
                ttl,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn pass_ttl(&self, id: &str) -> Result<(), KvError> {
        let mut services = self.services.lock().await;
        match services.get_mut(id) {
            Some(registration) => {
                registration.expires_at = Instant::now() + registration.ttl;
                Ok(())
            }
            None => Err(KvError::Unavailable(format!(
                "service {id} is not registered"
            ))),
        }
    }

    async fn check_health(&self, id: &str) -> Result<bool, KvError> {
        let services = self.services.lock().await;
        Ok(services
            .get(id)
            .map(|r| Instant::now() < r.expires_at)
            .unwrap_or(false))
    }
}
