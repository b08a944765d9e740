use crate::error::Result;
use async_trait::async_trait;

pub mod etcd;
pub use etcd::EtcdStore;

/// Hierarchical key/value namespace that backs the DNS resolver.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Creates or replaces `key`. Records carry no TTL.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;
}
