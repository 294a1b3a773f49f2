use crate::core::cache::KeyValueCollection;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory collection, lost when the process exits.
#[derive(Default)]
pub struct MemoryCollection {
    inner: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let entries = self.inner.lock().await;
        let value = entries.get(key).cloned();
        debug!(
            "Memory {} for key: {}",
            if value.is_some() { "HIT" } else { "MISS" },
            String::from_utf8_lossy(key)
        );
        Ok(value)
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut entries = self.inner.lock().await;
        debug!("Memory PUT for key: {}", String::from_utf8_lossy(key));
        entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &[u8]) -> Result<()> {
        self.inner.lock().await.remove(key);
        debug!("Memory REMOVE for key: {}", String::from_utf8_lossy(key));
        Ok(())
    }

    async fn values(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self.inner.lock().await.values().cloned().collect())
    }
}
