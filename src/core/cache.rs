//! Key-value storage abstractions shared by the durable client-side state.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A named collection of raw key-value pairs.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Stores `value` under `key`. Returns once the write is durable for
    /// persistent collections.
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    async fn remove(&self, key: &[u8]) -> Result<()>;

    /// All values in key order.
    async fn values(&self) -> Result<Vec<Vec<u8>>>;
}

/// Hands out collections by name.
pub trait Store: Send + Sync {
    fn get_collection(&self, name: &str, persist: bool) -> Result<Arc<dyn KeyValueCollection>>;
}
