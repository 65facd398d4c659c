pub mod error;
pub mod kv;
pub mod memory;
pub mod registry;

pub use error::KvError;
pub use kv::{KvStore, StoredValue};
pub use memory::{InMemoryKvStore, InMemoryServiceRegistry};
pub use registry::ServiceRegistry;

#[cfg(feature = "mock")]
pub use kv::MockKvStore;
#[cfg(feature = "mock")]
pub use registry::MockServiceRegistry;
