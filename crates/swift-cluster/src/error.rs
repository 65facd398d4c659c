use thiserror::Error;

use swift_kv::KvError;

/// Errors surfaced across the cluster runtime's public entry points.
/// Only `ManagerTaken` and `JobPackageConfigExtract` are meant to reach a
/// caller; everything else is logged at the reconciler that produced it
/// and the next tick retries.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("kv store unavailable: {0}")]
    KvUnavailable(String),
    #[error("cas conflict on key: {0}")]
    CasConflict(String),
    #[error("another online manager already holds this cluster: {0}")]
    ManagerTaken(String),
    #[error("failed to extract job package {0}: {1}")]
    JobPackageConfigExtract(String, String),
    #[error("malformed kv value at {0}: {1}")]
    MalformedKvValue(String, String),
    #[error("health probe failed for member {0}: {1}")]
    HealthProbeFailed(String, String),
}

impl From<KvError> for ClusterError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::Unavailable(msg) => ClusterError::KvUnavailable(msg),
            KvError::CasConflict(key) => ClusterError::CasConflict(key),
            KvError::Malformed(key, msg) => ClusterError::MalformedKvValue(key, msg),
            KvError::HealthProbeFailed(id, msg) => ClusterError::HealthProbeFailed(id, msg),
        }
    }
}
