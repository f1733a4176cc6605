//! Local filesystem storage implementation.
//!
//! JSON files under a state directory, written atomically (temp file, then
//! rename) so a crash mid-write never leaves a truncated cache behind.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── status.json
//! ├── dedup.json
//! ├── snapshot.json
//! └── held.json
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{ItemId, SubscriberId};
use crate::storage::{
    CatalogSnapshot, DedupCache, DedupKey, HeldSnapshot, SnapshotStore, StatusCache, dedup_key,
};

const STATUS_KEY: &str = "status.json";
const DEDUP_KEY: &str = "dedup.json";
const SNAPSHOT_KEY: &str = "snapshot.json";
const HELD_KEY: &str = "held.json";

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    pub(crate) fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Check that the root directory exists and is a directory.
    pub(crate) async fn probe(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root_dir).await?;
        let meta = tokio::fs::metadata(&self.root_dir).await?;
        if !meta.is_dir() {
            return Err(AppError::config(format!(
                "{} is not a directory",
                self.root_dir.display()
            )));
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    pub(crate) async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    pub(crate) async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    pub(crate) async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Remove a file, ignoring one that is already gone.
    pub(crate) async fn remove(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    pub(crate) async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

/// On-disk layout of the status cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StatusFile {
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    entries: BTreeMap<ItemId, bool>,
}

/// File-backed status cache.
///
/// The file is loaded once on first access; every write persists the whole
/// map before the in-memory copy is replaced.
pub struct LocalStatusCache {
    storage: LocalStorage,
    entries: Mutex<Option<BTreeMap<ItemId, bool>>>,
}

impl LocalStatusCache {
    pub fn new(storage: LocalStorage) -> Self {
        Self {
            storage,
            entries: Mutex::new(None),
        }
    }

    fn unavailable(e: AppError) -> AppError {
        AppError::cache("status", e)
    }

    async fn loaded(&self) -> Result<tokio::sync::MutexGuard<'_, Option<BTreeMap<ItemId, bool>>>> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            let file: StatusFile = self
                .storage
                .read_json(STATUS_KEY)
                .await
                .map_err(Self::unavailable)?
                .unwrap_or_default();
            log::debug!("Loaded {} status entries", file.entries.len());
            *guard = Some(file.entries);
        }
        Ok(guard)
    }

    async fn persist(&self, entries: &BTreeMap<ItemId, bool>) -> Result<()> {
        let file = StatusFile {
            updated_at: Some(Utc::now()),
            entries: entries.clone(),
        };
        self.storage
            .write_json(STATUS_KEY, &file)
            .await
            .map_err(Self::unavailable)
    }
}

#[async_trait]
impl StatusCache for LocalStatusCache {
    async fn ping(&self) -> Result<()> {
        self.storage.probe().await.map_err(Self::unavailable)?;
        self.loaded().await.map(|_| ())
    }

    async fn get(&self, id: &ItemId) -> Result<Option<bool>> {
        let guard = self.loaded().await?;
        Ok(guard.as_ref().and_then(|m| m.get(id).copied()))
    }

    async fn set(&self, id: &ItemId, open: bool) -> Result<()> {
        self.set_many(&[(id.clone(), open)]).await
    }

    async fn set_many(&self, entries: &[(ItemId, bool)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut guard = self.loaded().await?;
        let mut next = (*guard).clone().unwrap_or_default();
        for (id, open) in entries {
            next.insert(id.clone(), *open);
        }
        self.persist(&next).await?;
        *guard = Some(next);
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let guard = self.loaded().await?;
        Ok(guard.as_ref().map_or(0, BTreeMap::len))
    }
}

/// One line of `dedup.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DedupEntry {
    subscriber: SubscriberId,
    item: ItemId,
    expires_at: DateTime<Utc>,
}

/// File-backed dedup cache storing an expiry per key.
pub struct LocalDedupCache {
    storage: LocalStorage,
    lock: Mutex<()>,
}

impl LocalDedupCache {
    pub fn new(storage: LocalStorage) -> Self {
        Self {
            storage,
            lock: Mutex::new(()),
        }
    }

    fn unavailable(e: AppError) -> AppError {
        AppError::cache("dedup", e)
    }

    async fn load_live(&self, now: DateTime<Utc>) -> Result<BTreeMap<DedupKey, DateTime<Utc>>> {
        let entries: Vec<DedupEntry> = self
            .storage
            .read_json(DEDUP_KEY)
            .await
            .map_err(Self::unavailable)?
            .unwrap_or_default();
        Ok(entries
            .into_iter()
            .filter(|e| e.expires_at > now)
            .map(|e| ((e.subscriber, e.item), e.expires_at))
            .collect())
    }

    async fn store(&self, entries: BTreeMap<DedupKey, DateTime<Utc>>) -> Result<()> {
        let entries: Vec<DedupEntry> = entries
            .into_iter()
            .map(|((subscriber, item), expires_at)| DedupEntry {
                subscriber,
                item,
                expires_at,
            })
            .collect();
        self.storage
            .write_json(DEDUP_KEY, &entries)
            .await
            .map_err(Self::unavailable)
    }
}

#[async_trait]
impl DedupCache for LocalDedupCache {
    async fn ping(&self) -> Result<()> {
        self.storage.probe().await.map_err(Self::unavailable)?;
        self.load_live(Utc::now()).await.map(|_| ())
    }

    async fn exists(&self, subscriber: &SubscriberId, item: &ItemId) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let entries = self.load_live(Utc::now()).await?;
        Ok(entries.contains_key(&dedup_key(subscriber, item)))
    }

    async fn set_with_ttl(
        &self,
        subscriber: &SubscriberId,
        item: &ItemId,
        ttl: Duration,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| AppError::validation(e.to_string()))?;

        let mut entries = self.load_live(now).await?;
        entries.insert(dedup_key(subscriber, item), now + ttl);
        self.store(entries).await
    }

    async fn live_keys(&self) -> Result<usize> {
        let _guard = self.lock.lock().await;
        Ok(self.load_live(Utc::now()).await?.len())
    }
}

/// File-backed catalog snapshot store.
pub struct LocalSnapshotStore {
    storage: LocalStorage,
}

impl LocalSnapshotStore {
    pub fn new(storage: LocalStorage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl SnapshotStore for LocalSnapshotStore {
    async fn load_catalog(&self) -> Result<Option<CatalogSnapshot>> {
        self.storage.read_json(SNAPSHOT_KEY).await
    }

    async fn save_catalog(&self, snapshot: &CatalogSnapshot) -> Result<()> {
        self.storage.write_json(SNAPSHOT_KEY, snapshot).await
    }

    async fn load_held(&self) -> Result<Option<HeldSnapshot>> {
        self.storage.read_json(HELD_KEY).await
    }

    async fn save_held(&self, held: Option<&HeldSnapshot>) -> Result<()> {
        match held {
            Some(held) => self.storage.write_json(HELD_KEY, held).await,
            None => self.storage.remove(HELD_KEY).await,
        }
    }
}
