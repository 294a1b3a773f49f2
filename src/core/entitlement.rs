//! Durable ledger of rented items.

use crate::core::cache::{KeyValueCollection, Store};
use crate::core::payment::PaymentRail;
use crate::core::rental::{ItemId, RentalDuration};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Days before expiry at which a rental counts as expiring soon.
pub const EXPIRING_SOON_DAYS: i64 = 3;

/// Time-bounded access to a rented item. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub item_id: ItemId,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub method: PaymentRail,
}

impl Entitlement {
    pub fn new(
        item_id: ItemId,
        duration: RentalDuration,
        method: PaymentRail,
        acquired_at: DateTime<Utc>,
    ) -> Self {
        Self {
            item_id,
            acquired_at,
            expires_at: acquired_at + duration.to_duration(),
            method,
        }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Whole days left until expiry, rounded up. Negative once overdue.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        const DAY_MS: i64 = 24 * 60 * 60 * 1000;
        let ms = (self.expires_at - now).num_milliseconds();
        ms.div_euclid(DAY_MS) + i64::from(ms.rem_euclid(DAY_MS) != 0)
    }

    fn storage_key(&self) -> Vec<u8> {
        format!(
            "{:020}:{:020}",
            self.item_id,
            self.acquired_at.timestamp_millis()
        )
        .into_bytes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RentalStatus {
    Active,
    ExpiringSoon,
    Expired,
}

impl RentalStatus {
    pub fn of(entitlement: &Entitlement, now: DateTime<Utc>) -> Self {
        if !entitlement.is_active_at(now) {
            RentalStatus::Expired
        } else if entitlement.days_remaining(now) <= EXPIRING_SOON_DAYS {
            RentalStatus::ExpiringSoon
        } else {
            RentalStatus::Active
        }
    }
}

impl Display for RentalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RentalStatus::Active => "Active",
            RentalStatus::ExpiringSoon => "Expiring soon",
            RentalStatus::Expired => "Expired",
        })
    }
}

/// Single source of truth for "is this item currently rented".
///
/// Writes are serialized so the active check and the insert in
/// [`EntitlementStore::add`] happen atomically.
pub struct EntitlementStore {
    collection: Arc<dyn KeyValueCollection>,
    write_lock: Mutex<()>,
}

impl EntitlementStore {
    pub const COLLECTION: &'static str = "entitlements";

    pub fn new(collection: Arc<dyn KeyValueCollection>) -> Self {
        Self {
            collection,
            write_lock: Mutex::new(()),
        }
    }

    /// Opens the durable entitlement collection of `store`.
    pub fn open(store: &dyn Store) -> Result<Self> {
        Ok(Self::new(store.get_collection(Self::COLLECTION, true)?))
    }

    pub async fn has_active(&self, item_id: ItemId) -> Result<bool> {
        Ok(self.active(item_id, Utc::now()).await?.is_some())
    }

    pub async fn active(&self, item_id: ItemId, now: DateTime<Utc>) -> Result<Option<Entitlement>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|e| e.item_id == item_id && e.is_active_at(now)))
    }

    /// Records `entitlement` unless the item already has an active one, in
    /// which case the existing entitlement is returned untouched.
    pub async fn add(&self, entitlement: Entitlement) -> Result<Entitlement> {
        let _guard = self.write_lock.lock().await;

        if let Some(existing) = self.active(entitlement.item_id, Utc::now()).await? {
            debug!(
                "Item {} already has an active entitlement until {}",
                existing.item_id, existing.expires_at
            );
            return Ok(existing);
        }

        let bytes = serde_json::to_vec(&entitlement)?;
        self.collection
            .put(&entitlement.storage_key(), &bytes)
            .await
            .with_context(|| format!("Failed to record entitlement for item {}", entitlement.item_id))?;
        debug!(
            "Recorded entitlement for item {} until {}",
            entitlement.item_id, entitlement.expires_at
        );
        Ok(entitlement)
    }

    /// All entitlements, expired ones included.
    pub async fn list(&self) -> Result<Vec<Entitlement>> {
        self.collection
            .values()
            .await?
            .iter()
            .map(|bytes| {
                serde_json::from_slice(bytes).context("Failed to parse stored entitlement")
            })
            .collect()
    }
}
