//! In-process storage backends.
//!
//! Nothing here survives a restart. Used for dry runs and as test fakes.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::{ItemId, SubscriberId};
use crate::storage::{
    CatalogSnapshot, DedupCache, DedupKey, HeldSnapshot, SnapshotStore, StatusCache, dedup_key,
};

#[derive(Debug, Default)]
pub struct MemoryStatusCache {
    entries: RwLock<HashMap<ItemId, bool>>,
}

impl MemoryStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = (ItemId, bool)>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
        }
    }

    /// Copy of the current contents.
    pub async fn snapshot(&self) -> HashMap<ItemId, bool> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl StatusCache for MemoryStatusCache {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, id: &ItemId) -> Result<Option<bool>> {
        Ok(self.entries.read().await.get(id).copied())
    }

    async fn set(&self, id: &ItemId, open: bool) -> Result<()> {
        self.entries.write().await.insert(id.clone(), open);
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}

#[derive(Debug, Default)]
pub struct MemoryDedupCache {
    entries: RwLock<HashMap<DedupKey, DateTime<Utc>>>,
}

impl MemoryDedupCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupCache for MemoryDedupCache {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn exists(&self, subscriber: &SubscriberId, item: &ItemId) -> Result<bool> {
        let now = Utc::now();
        Ok(self
            .entries
            .read()
            .await
            .get(&dedup_key(subscriber, item))
            .is_some_and(|expires_at| *expires_at > now))
    }

    async fn set_with_ttl(
        &self,
        subscriber: &SubscriberId,
        item: &ItemId,
        ttl: Duration,
    ) -> Result<()> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| AppError::validation(e.to_string()))?;

        let mut entries = self.entries.write().await;
        entries.retain(|_, expires_at| *expires_at > now);
        entries.insert(dedup_key(subscriber, item), now + ttl);
        Ok(())
    }

    async fn live_keys(&self) -> Result<usize> {
        let now = Utc::now();
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|expires_at| **expires_at > now)
            .count())
    }
}

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshot: RwLock<Option<CatalogSnapshot>>,
    held: RwLock<Option<HeldSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<ItemId>) -> Self {
        Self {
            snapshot: RwLock::new(Some(CatalogSnapshot::new(items))),
            held: RwLock::default(),
        }
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load_catalog(&self) -> Result<Option<CatalogSnapshot>> {
        Ok(self.snapshot.read().await.clone())
    }

    async fn save_catalog(&self, snapshot: &CatalogSnapshot) -> Result<()> {
        *self.snapshot.write().await = Some(snapshot.clone());
        Ok(())
    }

    async fn load_held(&self) -> Result<Option<HeldSnapshot>> {
        Ok(self.held.read().await.clone())
    }

    async fn save_held(&self, held: Option<&HeldSnapshot>) -> Result<()> {
        *self.held.write().await = held.cloned();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_absent_is_not_closed() {
        let cache = MemoryStatusCache::new();
        let id = ItemId::from("A");
        assert_eq!(cache.get(&id).await.unwrap(), None);

        cache.set(&id, false).await.unwrap();
        assert_eq!(cache.get(&id).await.unwrap(), Some(false));
    }

    #[tokio::test]
    async fn test_set_many_default_impl() {
        let cache = MemoryStatusCache::new();
        cache
            .set_many(&[("A".into(), true), ("B".into(), false)])
            .await
            .unwrap();
        assert_eq!(cache.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dedup_expiry() {
        let cache = MemoryDedupCache::new();
        let s = SubscriberId::from("s1");
        let item = ItemId::from("A");

        cache
            .set_with_ttl(&s, &item, Duration::from_secs(0))
            .await
            .unwrap();
        assert!(!cache.exists(&s, &item).await.unwrap());

        cache
            .set_with_ttl(&s, &item, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cache.exists(&s, &item).await.unwrap());
        assert_eq!(cache.live_keys().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dedup_ids_with_separators_do_not_collide() {
        let cache = MemoryDedupCache::new();
        cache
            .set_with_ttl(&"a:b".into(), &"c".into(), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(!cache.exists(&"a".into(), &"b:c".into()).await.unwrap());
        assert!(cache.exists(&"a:b".into(), &"c".into()).await.unwrap());
    }
}
