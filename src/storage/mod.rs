//! Storage abstractions for engine state.
//!
//! Three stores survive between passes:
//! - Status cache: last observed open/closed state per item
//! - Dedup cache: TTL keys suppressing repeated similar-item matches
//! - Snapshot store: item identities seen by the previous successful pass
//!
//! ## Directory Structure (local backend)
//!
//! ```text
//! storage/
//! ├── status.json           # Status cache
//! ├── dedup.json            # Dedup cache (expiry per key)
//! ├── snapshot.json         # Catalog identities of the last pass
//! ├── held.json             # Snapshot size held back by the guard
//! └── inbox/                # Web-inbox entries per subscriber
//!     └── {subscriber}.json
//! ```
//!
//! Backend failures surface as `AppError::CacheUnavailable`, which aborts
//! the pass.

pub mod local;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{ItemId, SubscriberId};

// Re-export for convenience
pub use local::{LocalDedupCache, LocalSnapshotStore, LocalStatusCache, LocalStorage};
pub use memory::{MemoryDedupCache, MemorySnapshotStore, MemoryStatusCache};

/// Durable item identity -> open/closed store.
///
/// Absence means "never observed", not "closed".
#[async_trait]
pub trait StatusCache: Send + Sync {
    /// Fail fast when the backend is unreachable.
    async fn ping(&self) -> Result<()>;

    async fn get(&self, id: &ItemId) -> Result<Option<bool>>;

    async fn set(&self, id: &ItemId, open: bool) -> Result<()>;

    /// Write several entries. Backends with expensive writes override this.
    async fn set_many(&self, entries: &[(ItemId, bool)]) -> Result<()> {
        for (id, open) in entries {
            self.set(id, *open).await?;
        }
        Ok(())
    }

    /// Number of items ever observed.
    async fn len(&self) -> Result<usize>;
}

/// TTL-backed (subscriber, item) key store.
#[async_trait]
pub trait DedupCache: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn exists(&self, subscriber: &SubscriberId, item: &ItemId) -> Result<bool>;

    async fn set_with_ttl(
        &self,
        subscriber: &SubscriberId,
        item: &ItemId,
        ttl: Duration,
    ) -> Result<()>;

    /// Number of unexpired keys.
    async fn live_keys(&self) -> Result<usize>;
}

/// Item identities of the previous successful pass.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load_catalog(&self) -> Result<Option<CatalogSnapshot>>;

    async fn save_catalog(&self, snapshot: &CatalogSnapshot) -> Result<()>;

    /// Size of the snapshot the guard held back on the last pass.
    async fn load_held(&self) -> Result<Option<HeldSnapshot>>;

    /// Record a held snapshot, or clear it with `None`.
    async fn save_held(&self, held: Option<&HeldSnapshot>) -> Result<()>;
}

/// Stored identity set of one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    /// ISO 8601 timestamp of the pass
    pub updated_at: DateTime<Utc>,
    /// Item count
    pub count: usize,
    /// Item identities
    pub items: Vec<ItemId>,
}

impl CatalogSnapshot {
    pub fn new(items: Vec<ItemId>) -> Self {
        Self {
            updated_at: Utc::now(),
            count: items.len(),
            items,
        }
    }
}

/// Snapshot the guard refused to act on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeldSnapshot {
    pub held_at: DateTime<Utc>,
    pub count: usize,
}

impl HeldSnapshot {
    pub fn new(count: usize) -> Self {
        Self {
            held_at: Utc::now(),
            count,
        }
    }
}

/// Identity of a dedup entry. Both ids are kept whole, so ids containing
/// separators cannot collide.
pub type DedupKey = (SubscriberId, ItemId);

pub fn dedup_key(subscriber: &SubscriberId, item: &ItemId) -> DedupKey {
    (subscriber.clone(), item.clone())
}
