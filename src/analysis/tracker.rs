//! Category Tracker
//!
//! Per-category sets of in-flight product IDs. Each set lives behind its own
//! async mutex, so the set can only be read or modified while its lock is
//! held and unrelated categories never contend. The product whose removal
//! empties a set fires the completion handler, once per drain.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::storage::{ProductStore, SharedDatabase};
use crate::types::{CategoryKey, Result};

/// Invoked when a category's pending set drains to empty
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    async fn category_drained(&self, key: &CategoryKey, user_id: &str);
}

type PendingSet = Arc<Mutex<HashSet<String>>>;

pub struct CategoryTracker {
    db: SharedDatabase,
    pending: DashMap<CategoryKey, PendingSet>,
    handler: Arc<dyn CompletionHandler>,
}

impl CategoryTracker {
    pub fn new(db: SharedDatabase, handler: Arc<dyn CompletionHandler>) -> Self {
        Self {
            db,
            pending: DashMap::new(),
            handler,
        }
    }

    /// Clone the set handle out so no map shard guard is held across an await
    fn slot(&self, key: &CategoryKey) -> PendingSet {
        self.pending.entry(key.clone()).or_default().clone()
    }

    /// Resolve a product's category key from the store
    fn resolve(&self, product_id: &str) -> Result<Option<CategoryKey>> {
        Ok(self.resolve_owned(product_id)?.map(|(key, _)| key))
    }

    /// Category key and owning user of a stored product
    fn resolve_owned(&self, product_id: &str) -> Result<Option<(CategoryKey, String)>> {
        Ok(ProductStore::new(&self.db)
            .get(product_id)?
            .and_then(|p| p.category_key().map(|key| (key, p.user_id))))
    }

    /// Add the product to its category's pending set.
    /// Returns the key, or `None` when the product has no complete category.
    pub async fn track(&self, product_id: &str) -> Result<Option<CategoryKey>> {
        let Some(key) = self.resolve(product_id)? else {
            return Ok(None);
        };
        self.track_key(&key, product_id).await;
        Ok(Some(key))
    }

    pub async fn track_key(&self, key: &CategoryKey, product_id: &str) {
        let slot = self.slot(key);
        let mut set = slot.lock().await;
        set.insert(product_id.to_string());
        debug!(category = %key, product_id, pending = set.len(), "Tracking product");
    }

    /// Remove the product; if that empties the set, run the completion handler
    /// on behalf of the product's owner. Returns whether the handler ran.
    pub async fn untrack_and_maybe_drain(&self, product_id: &str) -> Result<bool> {
        let Some((key, owner)) = self.resolve_owned(product_id)? else {
            return Ok(false);
        };
        Ok(self.untrack_key(&key, product_id, &owner).await)
    }

    pub async fn untrack_key(&self, key: &CategoryKey, product_id: &str, user_id: &str) -> bool {
        let slot = self.slot(key);
        let drained = {
            let mut set = slot.lock().await;
            set.remove(product_id) && set.is_empty()
        };

        if !drained {
            return false;
        }

        info!(category = %key, product_id, "Category queue drained, checking completion");
        self.handler.category_drained(key, user_id).await;
        true
    }

    /// Number of products still pending for a category
    pub async fn pending_count(&self, key: &CategoryKey) -> usize {
        let Some(slot) = self.pending.get(key).map(|s| s.value().clone()) else {
            return 0;
        };
        let set = slot.lock().await;
        set.len()
    }
}
