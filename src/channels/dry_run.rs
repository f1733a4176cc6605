//! Channel that only logs what it would send.

use async_trait::async_trait;

use crate::channels::{AdminSink, ChannelResult, EmailDigest, EmailSender, PushSender, WebInbox};
use crate::models::{Admin, AdminSummary, ChangeRecord, Subscriber};

/// Stand-in for channels without a configured endpoint.
#[derive(Debug, Clone, Default)]
pub struct LogChannel;

#[async_trait]
impl WebInbox for LogChannel {
    async fn deliver(&self, subscriber: &Subscriber, record: &ChangeRecord) -> ChannelResult {
        log::info!(
            "[inbox] {} <- {} {}",
            subscriber.id,
            record.item.id,
            record.direction
        );
        Ok(())
    }
}

#[async_trait]
impl EmailSender for LogChannel {
    async fn send_batch(
        &self,
        subscriber: &Subscriber,
        to: &str,
        digest: &EmailDigest,
    ) -> ChannelResult {
        log::info!(
            "[email] {} <{}>: {} ({} opened, {} closed)",
            subscriber.id,
            to,
            digest.subject(),
            digest.opened.len(),
            digest.closed.len()
        );
        Ok(())
    }
}

#[async_trait]
impl PushSender for LogChannel {
    async fn send_count(&self, subscriber: &Subscriber, _device: &str, count: usize) -> ChannelResult {
        log::info!("[push] {}: {} changes", subscriber.id, count);
        Ok(())
    }
}

#[async_trait]
impl AdminSink for LogChannel {
    async fn send_summary(&self, admin: &Admin, to: &str, summary: &AdminSummary) -> ChannelResult {
        log::info!(
            "[admin] {} <{}>: {} added, {} opened, {} closed, {} removed",
            admin.id,
            to,
            summary.added.len(),
            summary.opened.len(),
            summary.closed.len(),
            summary.removed.len()
        );
        Ok(())
    }
}
