use crate::core::cache::KeyValueCollection;
use anyhow::{Context, Result};
use async_trait::async_trait;
use fjall::{Keyspace, PartitionHandle, PersistMode};
use std::sync::Arc;
use tracing::debug;

/// A fjall partition. Every mutation is synced to disk before returning.
pub struct DiskCollection {
    keyspace: Arc<Keyspace>,
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn new(keyspace: Arc<Keyspace>, partition: PartitionHandle) -> Self {
        Self {
            keyspace,
            partition,
        }
    }

    fn sync(&self) -> Result<()> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .context("Failed to persist keyspace")
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self
            .partition
            .get(key)
            .with_context(|| format!("Failed to read key: {}", String::from_utf8_lossy(key)))?
            .map(|slice| slice.to_vec());
        debug!(
            "Disk {} for key: {}",
            if value.is_some() { "HIT" } else { "MISS" },
            String::from_utf8_lossy(key)
        );
        Ok(value)
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.partition
            .insert(key, value)
            .with_context(|| format!("Failed to write key: {}", String::from_utf8_lossy(key)))?;
        self.sync()?;
        debug!("Disk PUT for key: {}", String::from_utf8_lossy(key));
        Ok(())
    }

    async fn remove(&self, key: &[u8]) -> Result<()> {
        self.partition
            .remove(key)
            .with_context(|| format!("Failed to remove key: {}", String::from_utf8_lossy(key)))?;
        self.sync()?;
        debug!("Disk REMOVE for key: {}", String::from_utf8_lossy(key));
        Ok(())
    }

    async fn values(&self) -> Result<Vec<Vec<u8>>> {
        self.partition
            .iter()
            .map(|entry| {
                entry
                    .map(|(_, value)| value.to_vec())
                    .context("Failed to iterate partition")
            })
            .collect()
    }
}
