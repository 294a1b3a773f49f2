use crate::core::cache::{KeyValueCollection, Store};
use crate::core::rental::ItemId;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Durable set of favorited catalog items.
pub struct FavoritesStore {
    collection: Arc<dyn KeyValueCollection>,
    write_lock: Mutex<()>,
}

impl FavoritesStore {
    pub const COLLECTION: &'static str = "favorites";

    pub fn new(collection: Arc<dyn KeyValueCollection>) -> Self {
        Self {
            collection,
            write_lock: Mutex::new(()),
        }
    }

    pub fn open(store: &dyn Store) -> Result<Self> {
        Ok(Self::new(store.get_collection(Self::COLLECTION, true)?))
    }

    fn key(item_id: ItemId) -> Vec<u8> {
        format!("{item_id:020}").into_bytes()
    }

    pub async fn contains(&self, item_id: ItemId) -> Result<bool> {
        Ok(self.collection.get(&Self::key(item_id)).await?.is_some())
    }

    /// Flips membership of `item_id`; returns whether it is now a favorite.
    pub async fn toggle(&self, item_id: ItemId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let key = Self::key(item_id);

        if self.collection.get(&key).await?.is_some() {
            self.collection.remove(&key).await?;
            debug!("Removed item {} from favorites", item_id);
            Ok(false)
        } else {
            self.collection
                .put(&key, item_id.to_string().as_bytes())
                .await?;
            debug!("Added item {} to favorites", item_id);
            Ok(true)
        }
    }

    /// Favorited items in ascending order.
    pub async fn list(&self) -> Result<Vec<ItemId>> {
        self.collection
            .values()
            .await?
            .iter()
            .map(|bytes| {
                std::str::from_utf8(bytes)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .context("Failed to parse stored favorite")
            })
            .collect()
    }
}
