//! Fixtures and recording fakes for pipeline tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Notify, RwLock};

use crate::channels::{
    AdminSink, ChannelResult, ChannelSet, EmailDigest, EmailSender, PushSender, WebInbox,
};
use crate::error::{AppError, ChannelError, Result};
use crate::models::{
    Admin, AdminSummary, ChangeRecord, FilterRule, Item, ItemId, Subscriber, SubscriberId,
    WatchRule,
};
use crate::services::CatalogProvider;
use crate::storage::DedupCache;

pub fn item(id: &str, open: bool) -> Item {
    item_in(id, "default", open)
}

pub fn item_in(id: &str, group: &str, open: bool) -> Item {
    Item {
        id: id.into(),
        title: format!("Course {id}"),
        open,
        grouping_key: group.into(),
        schedule: None,
        first_opened_at: None,
    }
}

pub fn subscriber(id: &str) -> Subscriber {
    Subscriber {
        id: id.into(),
        email: None,
        email_verified: false,
        push_device: None,
        channels: Default::default(),
        toggles: Default::default(),
    }
}

pub fn rule(id: &str, subscriber: &str, item: &str) -> WatchRule {
    WatchRule {
        id: id.into(),
        subscriber_id: subscriber.into(),
        item: item.into(),
        filters: Vec::new(),
        notify_similar: false,
        newly_opened_only: false,
        added_at: Utc::now() - chrono::Duration::days(1),
    }
}

pub fn similar_rule(id: &str, subscriber: &str, item: &str, filters: Vec<FilterRule>) -> WatchRule {
    WatchRule {
        filters,
        notify_similar: true,
        ..rule(id, subscriber, item)
    }
}

/// Records every channel call; optionally fails some of them.
#[derive(Default)]
pub struct Recorder {
    inbox: Mutex<Vec<(SubscriberId, ChangeRecord)>>,
    emails: Mutex<Vec<(SubscriberId, String, EmailDigest)>>,
    pushes: Mutex<Vec<(SubscriberId, String, usize)>>,
    summaries: Mutex<Vec<(String, AdminSummary)>>,
    failing_email: Option<SubscriberId>,
    invalid_device: bool,
    email_delay: Option<Duration>,
}

impl Recorder {
    pub fn failing_email_for(mut self, id: &str) -> Self {
        self.failing_email = Some(id.into());
        self
    }

    pub fn invalid_device(mut self) -> Self {
        self.invalid_device = true;
        self
    }

    pub fn email_delay(mut self, delay: Duration) -> Self {
        self.email_delay = Some(delay);
        self
    }

    pub fn channel_set(self: &Arc<Self>) -> ChannelSet {
        ChannelSet {
            web: self.clone(),
            email: self.clone(),
            push: self.clone(),
            admin: self.clone(),
        }
    }

    pub fn inbox(&self) -> Vec<(SubscriberId, ChangeRecord)> {
        self.inbox.lock().unwrap().clone()
    }

    pub fn emails(&self) -> Vec<(SubscriberId, String, EmailDigest)> {
        self.emails.lock().unwrap().clone()
    }

    pub fn pushes(&self) -> Vec<(SubscriberId, String, usize)> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn summaries(&self) -> Vec<(String, AdminSummary)> {
        self.summaries.lock().unwrap().clone()
    }

    /// Inbox entries of one subscriber.
    pub fn inbox_of(&self, id: &str) -> Vec<ChangeRecord> {
        self.inbox()
            .into_iter()
            .filter(|(s, _)| s.as_str() == id)
            .map(|(_, r)| r)
            .collect()
    }
}

#[async_trait]
impl WebInbox for Recorder {
    async fn deliver(&self, subscriber: &Subscriber, record: &ChangeRecord) -> ChannelResult {
        self.inbox
            .lock()
            .unwrap()
            .push((subscriber.id.clone(), record.clone()));
        Ok(())
    }
}

#[async_trait]
impl EmailSender for Recorder {
    async fn send_batch(
        &self,
        subscriber: &Subscriber,
        to: &str,
        digest: &EmailDigest,
    ) -> ChannelResult {
        if let Some(delay) = self.email_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_email.as_ref() == Some(&subscriber.id) {
            return Err(ChannelError::Rejected {
                status: 500,
                body: "relay down".into(),
            });
        }
        self.emails
            .lock()
            .unwrap()
            .push((subscriber.id.clone(), to.to_string(), digest.clone()));
        Ok(())
    }
}

#[async_trait]
impl PushSender for Recorder {
    async fn send_count(&self, subscriber: &Subscriber, device: &str, count: usize) -> ChannelResult {
        if self.invalid_device {
            return Err(ChannelError::InvalidDevice);
        }
        self.pushes
            .lock()
            .unwrap()
            .push((subscriber.id.clone(), device.to_string(), count));
        Ok(())
    }
}

#[async_trait]
impl AdminSink for Recorder {
    async fn send_summary(&self, admin: &Admin, _to: &str, summary: &AdminSummary) -> ChannelResult {
        self.summaries
            .lock()
            .unwrap()
            .push((admin.id.clone(), summary.clone()));
        Ok(())
    }
}

/// Catalog whose snapshot tests can swap between passes.
#[derive(Default)]
pub struct StaticCatalog {
    items: RwLock<Vec<Item>>,
    gate: Option<Arc<Notify>>,
}

impl StaticCatalog {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items: RwLock::new(items),
            gate: None,
        }
    }

    /// Every listing waits until the gate is notified.
    pub fn gated(items: Vec<Item>, gate: Arc<Notify>) -> Self {
        Self {
            items: RwLock::new(items),
            gate: Some(gate),
        }
    }

    pub async fn set(&self, items: Vec<Item>) {
        *self.items.write().await = items;
    }
}

#[async_trait]
impl CatalogProvider for StaticCatalog {
    async fn list_all_items(&self) -> Result<Vec<Item>> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self.items.read().await.clone())
    }
}

/// Dedup cache that answers pings but fails every lookup.
pub struct FailingDedupCache;

#[async_trait]
impl DedupCache for FailingDedupCache {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn exists(&self, _subscriber: &SubscriberId, _item: &ItemId) -> Result<bool> {
        Err(AppError::cache("dedup", "connection reset"))
    }

    async fn set_with_ttl(
        &self,
        _subscriber: &SubscriberId,
        _item: &ItemId,
        _ttl: Duration,
    ) -> Result<()> {
        Err(AppError::cache("dedup", "connection reset"))
    }

    async fn live_keys(&self) -> Result<usize> {
        Ok(0)
    }
}
