//! Batch dispatch.
//!
//! Each subscriber batch is sent over every channel the subscriber enabled:
//!
//! - Web inbox: one entry per change record
//! - Email: one message for the whole batch, verified addresses only
//! - Push: one count-only notification, registered devices only
//!
//! Channels are independent. A failure is logged and recorded, never
//! propagated, and never blocks another channel or subscriber.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::channels::{ChannelResult, ChannelSet, EmailDigest};
use crate::error::ChannelError;
use crate::models::{ChangeRecord, Subscriber, SubscriberId};
use crate::pipeline::batch::{BatchState, SubscriberBatch};
use crate::services::SubscriptionIndex;

/// What happened on one channel for one batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOutcome {
    /// Not enabled or not eligible
    Skipped,
    Delivered,
    Failed(ChannelError),
    /// Push device was rejected and removed from the subscriber
    DeviceCleared,
}

impl ChannelOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ChannelOutcome::Failed(_) | ChannelOutcome::DeviceCleared)
    }
}

/// Dispatch result for one subscriber.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub subscriber: SubscriberId,
    pub records: usize,
    pub web: ChannelOutcome,
    /// Inbox entries written
    pub web_delivered: usize,
    pub email: ChannelOutcome,
    pub push: ChannelOutcome,
    pub state: BatchState,
}

impl DispatchReport {
    pub fn failures(&self) -> usize {
        [&self.web, &self.email, &self.push]
            .into_iter()
            .filter(|o| o.is_failure())
            .count()
    }
}

pub struct Dispatcher {
    channels: ChannelSet,
    index: Arc<dyn SubscriptionIndex>,
    timeout: Duration,
    max_concurrent: usize,
}

impl Dispatcher {
    pub fn new(
        channels: ChannelSet,
        index: Arc<dyn SubscriptionIndex>,
        timeout: Duration,
        max_concurrent: usize,
    ) -> Self {
        Self {
            channels,
            index,
            timeout,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Dispatch every batch, several subscribers at a time.
    pub async fn dispatch_all(&self, batches: Vec<SubscriberBatch>) -> Vec<DispatchReport> {
        let mut reports: Vec<DispatchReport> = stream::iter(batches)
            .map(|batch| self.dispatch(batch))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;
        reports.sort_by(|a, b| a.subscriber.cmp(&b.subscriber));
        reports
    }

    pub async fn dispatch(&self, mut batch: SubscriberBatch) -> DispatchReport {
        batch.advance();
        debug_assert_eq!(batch.state(), BatchState::Dispatching);

        let subscriber = batch.subscriber();
        let records = batch.records();
        let ((web, web_delivered), email, push) = tokio::join!(
            self.send_web(subscriber, records),
            self.send_email(subscriber, records),
            self.send_push(subscriber, records.len()),
        );

        let report = DispatchReport {
            subscriber: subscriber.id.clone(),
            records: records.len(),
            web,
            web_delivered,
            email,
            push,
            state: BatchState::Done,
        };
        batch.advance();
        report
    }

    async fn send_web(
        &self,
        subscriber: &Subscriber,
        records: &[ChangeRecord],
    ) -> (ChannelOutcome, usize) {
        if !subscriber.channels.web {
            return (ChannelOutcome::Skipped, 0);
        }

        let mut delivered = 0;
        let mut first_error = None;
        for record in records {
            match self
                .bounded(self.channels.web.deliver(subscriber, record))
                .await
            {
                Ok(()) => delivered += 1,
                Err(e) => {
                    log::warn!(
                        "Inbox entry {} for {} failed: {}",
                        record.item.id,
                        subscriber.id,
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            None => (ChannelOutcome::Delivered, delivered),
            Some(e) => (ChannelOutcome::Failed(e), delivered),
        }
    }

    async fn send_email(&self, subscriber: &Subscriber, records: &[ChangeRecord]) -> ChannelOutcome {
        let Some(to) = subscriber.email_address() else {
            return ChannelOutcome::Skipped;
        };

        let digest = EmailDigest::from_records(records);
        match self
            .bounded(self.channels.email.send_batch(subscriber, to, &digest))
            .await
        {
            Ok(()) => ChannelOutcome::Delivered,
            Err(e) => {
                log::warn!("Email to {} failed: {}", subscriber.id, e);
                ChannelOutcome::Failed(e)
            }
        }
    }

    async fn send_push(&self, subscriber: &Subscriber, count: usize) -> ChannelOutcome {
        let Some(device) = subscriber.push_target() else {
            return ChannelOutcome::Skipped;
        };

        match self
            .bounded(self.channels.push.send_count(subscriber, device, count))
            .await
        {
            Ok(()) => ChannelOutcome::Delivered,
            Err(ChannelError::InvalidDevice) => {
                log::info!("Clearing invalid push device of {}", subscriber.id);
                if let Err(e) = self.index.clear_push_device(&subscriber.id).await {
                    log::warn!("Failed to clear push device of {}: {}", subscriber.id, e);
                }
                ChannelOutcome::DeviceCleared
            }
            Err(e) => {
                log::warn!("Push to {} failed: {}", subscriber.id, e);
                ChannelOutcome::Failed(e)
            }
        }
    }

    async fn bounded(&self, call: impl Future<Output = ChannelResult>) -> ChannelResult {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or_else(|_| Err(ChannelError::Timeout(self.timeout.as_millis() as u64)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use crate::pipeline::batch::Batcher;
    use crate::pipeline::matcher::Match;
    use crate::pipeline::test_support::{Recorder, item, subscriber};
    use crate::services::{MemorySubscriptionIndex, SubscriptionData};

    fn batches(subscribers: Vec<Subscriber>, items: &[&str]) -> Vec<SubscriberBatch> {
        let mut batcher = Batcher::new();
        for s in subscribers {
            for id in items {
                batcher.add(Match {
                    subscriber: s.clone(),
                    item: item(id, true),
                    direction: Direction::Opened,
                    direct: true,
                    similar: Default::default(),
                });
            }
        }
        batcher.finish()
    }

    fn all_channels(id: &str) -> Subscriber {
        let mut s = subscriber(id);
        s.email = Some(format!("{id}@example.com"));
        s.email_verified = true;
        s.channels.email = true;
        s.push_device = Some(format!("device-{id}"));
        s.channels.push = true;
        s
    }

    fn dispatcher(recorder: &Arc<Recorder>, index: Arc<dyn SubscriptionIndex>) -> Dispatcher {
        Dispatcher::new(
            recorder.channel_set(),
            index,
            Duration::from_millis(200),
            4,
        )
    }

    #[tokio::test]
    async fn test_fan_out_per_channel() {
        let recorder = Arc::new(Recorder::default());
        let index = Arc::new(MemorySubscriptionIndex::default());
        let dispatcher = dispatcher(&recorder, index);

        let reports = dispatcher
            .dispatch_all(batches(vec![all_channels("s1")], &["A", "B", "C"]))
            .await;

        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.web, ChannelOutcome::Delivered);
        assert_eq!(report.web_delivered, 3);
        assert_eq!(report.email, ChannelOutcome::Delivered);
        assert_eq!(report.push, ChannelOutcome::Delivered);
        assert_eq!(report.state, BatchState::Done);

        assert_eq!(recorder.inbox().len(), 3);
        assert_eq!(recorder.emails().len(), 1);
        assert_eq!(recorder.emails()[0].2.len(), 3);
        let pushes = recorder.pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].1, "device-s1");
        assert_eq!(pushes[0].2, 3);
    }

    #[tokio::test]
    async fn test_unverified_email_is_skipped() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = dispatcher(&recorder, Arc::new(MemorySubscriptionIndex::default()));

        let mut s = all_channels("s1");
        s.email_verified = false;
        let reports = dispatcher.dispatch_all(batches(vec![s], &["A"])).await;

        assert_eq!(reports[0].email, ChannelOutcome::Skipped);
        assert!(recorder.emails().is_empty());
    }

    #[tokio::test]
    async fn test_web_inbox_follows_enabled_flag_only() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = dispatcher(&recorder, Arc::new(MemorySubscriptionIndex::default()));

        // No verified channel at all still gets inbox entries
        let unverified = subscriber("s1");
        let mut opted_out = subscriber("s2");
        opted_out.channels.web = false;
        let reports = dispatcher
            .dispatch_all(batches(vec![unverified, opted_out], &["A"]))
            .await;

        assert_eq!(reports[0].web, ChannelOutcome::Delivered);
        assert_eq!(reports[1].web, ChannelOutcome::Skipped);
        assert_eq!(recorder.inbox_of("s1").len(), 1);
        assert!(recorder.inbox_of("s2").is_empty());
    }

    #[tokio::test]
    async fn test_email_failure_does_not_block_others() {
        let recorder = Arc::new(Recorder::default().failing_email_for("s1"));
        let dispatcher = dispatcher(&recorder, Arc::new(MemorySubscriptionIndex::default()));

        let reports = dispatcher
            .dispatch_all(batches(vec![all_channels("s1"), all_channels("s2")], &["A"]))
            .await;

        assert!(matches!(reports[0].email, ChannelOutcome::Failed(_)));
        assert_eq!(reports[0].web, ChannelOutcome::Delivered);
        assert_eq!(reports[0].push, ChannelOutcome::Delivered);
        assert_eq!(reports[1].email, ChannelOutcome::Delivered);
        assert_eq!(reports[0].failures(), 1);
    }

    #[tokio::test]
    async fn test_invalid_device_is_cleared() {
        let recorder = Arc::new(Recorder::default().invalid_device());
        let index = Arc::new(MemorySubscriptionIndex::new(SubscriptionData {
            subscribers: vec![all_channels("s1")],
            ..Default::default()
        }));
        let dispatcher = dispatcher(&recorder, index.clone());

        let reports = dispatcher
            .dispatch_all(batches(vec![all_channels("s1")], &["A"]))
            .await;

        assert_eq!(reports[0].push, ChannelOutcome::DeviceCleared);
        let stored = index.subscriber(&"s1".into()).await.unwrap();
        assert!(stored.push_device.is_none());
    }

    #[tokio::test]
    async fn test_slow_channel_times_out() {
        let recorder = Arc::new(Recorder::default().email_delay(Duration::from_secs(5)));
        let dispatcher = Dispatcher::new(
            recorder.channel_set(),
            Arc::new(MemorySubscriptionIndex::default()),
            Duration::from_millis(20),
            4,
        );

        let reports = dispatcher
            .dispatch_all(batches(vec![all_channels("s1")], &["A"]))
            .await;

        assert_eq!(
            reports[0].email,
            ChannelOutcome::Failed(ChannelError::Timeout(20))
        );
        assert_eq!(reports[0].web, ChannelOutcome::Delivered);
    }
}
