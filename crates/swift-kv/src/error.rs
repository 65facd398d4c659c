use thiserror::Error;

/// Errors surfaced by the KV façade and service registry.
///
/// `CasConflict` is expected traffic, not a fault: callers retry on it.
/// Everything else is the adapter telling us the backing store or the
/// health subsystem is unavailable right now.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv store unavailable: {0}")]
    Unavailable(String),
    #[error("cas conflict on key: {0}")]
    CasConflict(String),
    #[error("malformed value at key {0}: {1}")]
    Malformed(String, String),
    #[error("health probe failed for service {0}: {1}")]
    HealthProbeFailed(String, String),
}
