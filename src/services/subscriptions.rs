// src/services/subscriptions.rs

//! Subscription index backends.
//!
//! Profiles, watch rules and admin settings are managed elsewhere; the engine
//! reads a fresh view once per pass. The only write is clearing a push device
//! identity that the push gateway reported as invalid.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::error::{AppError, Result};
use crate::models::{Admin, Subscriber, SubscriberId, WatchRule};
use crate::storage::LocalStorage;

/// Everything the subscription index exposes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionData {
    #[serde(default)]
    pub subscribers: Vec<Subscriber>,

    #[serde(default)]
    pub watch_rules: Vec<WatchRule>,

    #[serde(default)]
    pub admins: Vec<Admin>,
}

impl SubscriptionData {
    /// Returns true if a device identity was removed.
    fn clear_push_device(&mut self, id: &SubscriberId) -> bool {
        self.subscribers
            .iter_mut()
            .find(|s| &s.id == id)
            .and_then(|s| s.push_device.take())
            .is_some()
    }
}

#[async_trait]
pub trait SubscriptionIndex: Send + Sync {
    async fn list_watch_rules(&self) -> Result<Vec<WatchRule>>;

    async fn list_subscribers(&self) -> Result<Vec<Subscriber>>;

    /// Administrators, whether or not they opted into catalog alerts.
    async fn list_admins(&self) -> Result<Vec<Admin>>;

    /// Forget an invalid or expired push device identity.
    async fn clear_push_device(&self, subscriber: &SubscriberId) -> Result<()>;
}

/// JSON file holding subscribers, watch rules and admins.
pub struct FileSubscriptionIndex {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSubscriptionIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<SubscriptionData> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    "Subscription file {} not found, treating as empty",
                    self.path.display()
                );
                Ok(SubscriptionData::default())
            }
            Err(e) => Err(AppError::subscription(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn save(&self, data: &SubscriptionData) -> Result<()> {
        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::config("subscription path has no file name"))?;
        let dir = self.path.parent().map(PathBuf::from).unwrap_or_default();
        LocalStorage::new(dir).write_json(file_name, data).await
    }
}

#[async_trait]
impl SubscriptionIndex for FileSubscriptionIndex {
    async fn list_watch_rules(&self) -> Result<Vec<WatchRule>> {
        Ok(self.load().await?.watch_rules)
    }

    async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
        Ok(self.load().await?.subscribers)
    }

    async fn list_admins(&self) -> Result<Vec<Admin>> {
        Ok(self.load().await?.admins)
    }

    async fn clear_push_device(&self, subscriber: &SubscriberId) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await?;
        if data.clear_push_device(subscriber) {
            self.save(&data).await?;
        }
        Ok(())
    }
}

/// In-process subscription index.
#[derive(Debug, Default)]
pub struct MemorySubscriptionIndex {
    data: RwLock<SubscriptionData>,
}

impl MemorySubscriptionIndex {
    pub fn new(data: SubscriptionData) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    pub async fn subscriber(&self, id: &SubscriberId) -> Option<Subscriber> {
        self.data
            .read()
            .await
            .subscribers
            .iter()
            .find(|s| &s.id == id)
            .cloned()
    }
}

#[async_trait]
impl SubscriptionIndex for MemorySubscriptionIndex {
    async fn list_watch_rules(&self) -> Result<Vec<WatchRule>> {
        Ok(self.data.read().await.watch_rules.clone())
    }

    async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
        Ok(self.data.read().await.subscribers.clone())
    }

    async fn list_admins(&self) -> Result<Vec<Admin>> {
        Ok(self.data.read().await.admins.clone())
    }

    async fn clear_push_device(&self, subscriber: &SubscriberId) -> Result<()> {
        self.data.write().await.clear_push_device(subscriber);
        Ok(())
    }
}
