//! Delivery channels consumed by the dispatcher.
//!
//! Every adapter returns `ChannelError` instead of panicking or propagating
//! `AppError`; the dispatcher logs failures and moves on.
//!
//! - `LocalInbox`: web-inbox entries, one per change record
//! - `HttpEmailSender`: one email per batch, plus admin summaries
//! - `FcmPushSender`: one count-only push per batch
//! - `LogChannel`: logs instead of sending (no endpoint configured)

mod dry_run;
mod http;
mod inbox;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ChannelError;
use crate::models::{Admin, AdminSummary, ChangeRecord, Direction, Subscriber};

pub use dry_run::LogChannel;
pub use http::{FcmPushSender, HttpEmailSender, classify_push_response};
pub use inbox::{InboxEntry, LocalInbox};

/// Result of a single channel call.
pub type ChannelResult = std::result::Result<(), ChannelError>;

#[async_trait]
pub trait WebInbox: Send + Sync {
    /// Persist one entry for one change record.
    async fn deliver(&self, subscriber: &Subscriber, record: &ChangeRecord) -> ChannelResult;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send one message summarizing the whole batch.
    async fn send_batch(&self, subscriber: &Subscriber, to: &str, digest: &EmailDigest)
    -> ChannelResult;
}

#[async_trait]
pub trait PushSender: Send + Sync {
    /// Send one push carrying only the number of changes.
    async fn send_count(&self, subscriber: &Subscriber, device: &str, count: usize)
    -> ChannelResult;
}

#[async_trait]
pub trait AdminSink: Send + Sync {
    /// Send the aggregate summary of one pass.
    async fn send_summary(&self, admin: &Admin, to: &str, summary: &AdminSummary)
    -> ChannelResult;
}

/// The channel adapters an engine dispatches through.
#[derive(Clone)]
pub struct ChannelSet {
    pub web: Arc<dyn WebInbox>,
    pub email: Arc<dyn EmailSender>,
    pub push: Arc<dyn PushSender>,
    pub admin: Arc<dyn AdminSink>,
}

impl ChannelSet {
    /// Every channel logs instead of sending.
    pub fn logging() -> Self {
        let channel = Arc::new(LogChannel);
        Self {
            web: channel.clone(),
            email: channel.clone(),
            push: channel.clone(),
            admin: channel,
        }
    }
}

/// Email payload: a batch grouped by direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmailDigest {
    pub opened: Vec<ChangeRecord>,
    pub closed: Vec<ChangeRecord>,
}

impl EmailDigest {
    pub fn from_records(records: &[ChangeRecord]) -> Self {
        let (opened, closed) = records
            .iter()
            .cloned()
            .partition(|r| r.direction == Direction::Opened);
        Self { opened, closed }
    }

    pub fn len(&self) -> usize {
        self.opened.len() + self.closed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subject(&self) -> String {
        match self.len() {
            1 => "1 course availability change".to_string(),
            n => format!("{n} course availability changes"),
        }
    }
}
