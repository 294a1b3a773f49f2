pub mod disk;
pub mod memory;

use crate::core::cache::{KeyValueCollection, Store};
use anyhow::{Context, Result, anyhow};
use disk::DiskCollection;
use fjall::{Keyspace, PartitionCreateOptions};
use memory::MemoryCollection;
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, RwLock},
};
use tracing::debug;

/// A thread-safe key-value store that can hold multiple collections.
///
/// Persistent collections map to fjall partitions inside a single keyspace;
/// the rest live in memory for the lifetime of the store.
pub struct KeyValueStore {
    collections: RwLock<HashMap<String, Arc<dyn KeyValueCollection>>>,
    keyspace: Option<Arc<Keyspace>>,
}

impl KeyValueStore {
    /// Opens (or creates) the durable store under `data_path`.
    pub fn open(data_path: &Path) -> Result<Self> {
        let store_dir = data_path.join("store");
        std::fs::create_dir_all(&store_dir)
            .with_context(|| format!("Failed to create directory: {}", store_dir.display()))?;
        let keyspace = fjall::Config::new(&store_dir)
            .open()
            .with_context(|| format!("Failed to open store at {}", store_dir.display()))?;
        debug!("Opened store at {}", store_dir.display());

        Ok(Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: Some(Arc::new(keyspace)),
        })
    }

    /// A store without a backing keyspace. Only non-persistent collections
    /// can be requested from it.
    pub fn ephemeral() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: None,
        }
    }
}

impl Store for KeyValueStore {
    fn get_collection(&self, name: &str, persist: bool) -> Result<Arc<dyn KeyValueCollection>> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| anyhow!("Store lock poisoned"))?;
        if let Some(existing) = collections.get(name) {
            return Ok(Arc::clone(existing));
        }

        let collection: Arc<dyn KeyValueCollection> = if persist {
            let keyspace = self
                .keyspace
                .as_ref()
                .ok_or_else(|| anyhow!("No durable storage available for collection: {name}"))?;
            let partition = keyspace
                .open_partition(name, PartitionCreateOptions::default())
                .with_context(|| format!("Failed to open collection: {name}"))?;
            Arc::new(DiskCollection::new(Arc::clone(keyspace), partition))
        } else {
            Arc::new(MemoryCollection::new())
        };

        collections.insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }
}
