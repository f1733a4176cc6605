//! Web-inbox entries stored per subscriber.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::channels::{ChannelResult, WebInbox};
use crate::error::{ChannelError, Result};
use crate::models::{ChangeRecord, Direction, ItemId, Subscriber, SubscriberId, TriggerSource};
use crate::storage::LocalStorage;

/// One inbox notification, independently mark-as-read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxEntry {
    pub id: String,
    pub item: ItemId,
    pub title: String,
    pub direction: Direction,
    pub triggers: BTreeSet<TriggerSource>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl InboxEntry {
    fn new(subscriber: &SubscriberId, record: &ChangeRecord, created_at: DateTime<Utc>) -> Self {
        Self {
            id: entry_id(subscriber, &record.item.id, record.direction, created_at),
            item: record.item.id.clone(),
            title: record.item.title.clone(),
            direction: record.direction,
            triggers: record.triggers.clone(),
            created_at,
            read: false,
        }
    }
}

/// Stable short id for an inbox entry.
fn entry_id(
    subscriber: &SubscriberId,
    item: &ItemId,
    direction: Direction,
    created_at: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subscriber.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(item.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(direction.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(created_at.to_rfc3339().as_bytes());
    hex::encode(&hasher.finalize()[..8])
}

/// Inbox backed by `inbox/{subscriber}.json` files.
pub struct LocalInbox {
    storage: LocalStorage,
    lock: Mutex<()>,
}

impl LocalInbox {
    pub fn new(storage: LocalStorage) -> Self {
        Self {
            storage,
            lock: Mutex::new(()),
        }
    }

    fn key(subscriber: &SubscriberId) -> String {
        let safe: String = subscriber
            .as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("inbox/{safe}.json")
    }

    /// All entries for a subscriber, oldest first.
    pub async fn list(&self, subscriber: &SubscriberId) -> Result<Vec<InboxEntry>> {
        Ok(self
            .storage
            .read_json(&Self::key(subscriber))
            .await?
            .unwrap_or_default())
    }

    /// Mark one entry as read. Returns false if no such entry exists.
    pub async fn mark_read(&self, subscriber: &SubscriberId, entry_id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut entries = self.list(subscriber).await?;
        let Some(entry) = entries.iter_mut().find(|e| e.id == entry_id) else {
            return Ok(false);
        };
        entry.read = true;
        self.storage
            .write_json(&Self::key(subscriber), &entries)
            .await?;
        Ok(true)
    }

    async fn append(&self, subscriber: &SubscriberId, entry: InboxEntry) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.list(subscriber).await?;
        entries.push(entry);
        self.storage.write_json(&Self::key(subscriber), &entries).await
    }
}

#[async_trait]
impl WebInbox for LocalInbox {
    async fn deliver(&self, subscriber: &Subscriber, record: &ChangeRecord) -> ChannelResult {
        let entry = InboxEntry::new(&subscriber.id, record, Utc::now());
        self.append(&subscriber.id, entry)
            .await
            .map_err(|e| ChannelError::Storage(e.to_string()))
    }
}
