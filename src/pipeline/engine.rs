//! One availability pass, end to end.
//!
//! ```text
//! snapshot -> guard -> detect -> match -> dedup screen
//!          -> commit status -> save snapshot -> batch -> dispatch -> admin flush
//! ```
//!
//! Every failure up to and including the dedup screen aborts the pass with
//! no status or dedup state written, so a retried pass sees exactly what the
//! aborted one saw. The only write before that point is the size of a
//! snapshot the guard held back.
//! Channel failures after the commit are recorded in the report only.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::channels::{AdminSink, ChannelSet};
use crate::error::Result;
use crate::models::Config;
use crate::pipeline::admin::{AdminAccumulator, AdminFanout};
use crate::pipeline::batch::Batcher;
use crate::pipeline::dedup::Deduplicator;
use crate::pipeline::detect::{ChangeDetector, dedupe_snapshot};
use crate::pipeline::diff::existence_diff;
use crate::pipeline::dispatch::{DispatchReport, Dispatcher};
use crate::pipeline::guard::{SnapshotGuard, Verdict};
use crate::pipeline::matcher::{Matcher, SubscriptionView};
use crate::services::{CatalogProvider, SubscriptionIndex};
use crate::storage::{CatalogSnapshot, DedupCache, HeldSnapshot, SnapshotStore, StatusCache};
use crate::utils::log::{header, step, sub_item, summary};

const STEPS: usize = 5;

/// Components an engine is wired from.
pub struct EngineParts {
    pub catalog: Arc<dyn CatalogProvider>,
    pub status: Arc<dyn StatusCache>,
    pub dedup: Arc<dyn DedupCache>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub index: Arc<dyn SubscriptionIndex>,
    pub channels: ChannelSet,
}

/// Outcome of one pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Items in the snapshot
    pub items: usize,
    /// Items observed for the first time
    pub bootstrapped: usize,
    pub transitions: usize,
    pub added: usize,
    pub removed: usize,
    /// Subscribers with a non-empty batch
    pub matched_subscribers: usize,
    pub change_records: usize,
    /// Similar matches dropped by the dedup cache
    pub suppressed_similar: usize,
    pub dispatch: Vec<DispatchReport>,
    pub admin_summaries_sent: usize,
}

impl PassReport {
    pub fn channel_failures(&self) -> usize {
        self.dispatch.iter().map(DispatchReport::failures).sum()
    }

    pub fn log_summary(&self) {
        let elapsed = self.finished_at - self.started_at;
        summary(
            "Pass complete",
            &[
                ("items", self.items.to_string()),
                ("bootstrapped", self.bootstrapped.to_string()),
                ("transitions", self.transitions.to_string()),
                ("added", self.added.to_string()),
                ("removed", self.removed.to_string()),
                ("subscribers", self.matched_subscribers.to_string()),
                ("records", self.change_records.to_string()),
                ("suppressed", self.suppressed_similar.to_string()),
                ("failures", self.channel_failures().to_string()),
                ("admin summaries", self.admin_summaries_sent.to_string()),
                ("elapsed", format!("{}ms", elapsed.num_milliseconds())),
            ],
        );
    }
}

/// State owned by a single running pass.
struct Pass {
    started_at: DateTime<Utc>,
    admin: AdminAccumulator,
}

impl Pass {
    fn begin() -> Self {
        Self {
            started_at: Utc::now(),
            admin: AdminAccumulator::new(),
        }
    }
}

pub struct Engine {
    catalog: Arc<dyn CatalogProvider>,
    status: Arc<dyn StatusCache>,
    dedup: Arc<dyn DedupCache>,
    snapshots: Arc<dyn SnapshotStore>,
    index: Arc<dyn SubscriptionIndex>,
    admin_sink: Arc<dyn AdminSink>,
    dispatcher: Dispatcher,
    guard: SnapshotGuard,
    dedup_ttl: Duration,
    channel_timeout: Duration,
}

impl Engine {
    pub fn new(config: &Config, parts: EngineParts) -> Self {
        let channel_timeout = config.dispatch.channel_timeout();
        Self {
            dispatcher: Dispatcher::new(
                parts.channels.clone(),
                parts.index.clone(),
                channel_timeout,
                config.dispatch.max_concurrent,
            ),
            admin_sink: parts.channels.admin,
            catalog: parts.catalog,
            status: parts.status,
            dedup: parts.dedup,
            snapshots: parts.snapshots,
            index: parts.index,
            guard: SnapshotGuard::new(&config.guard),
            dedup_ttl: config.dedup.ttl(),
            channel_timeout,
        }
    }

    pub fn status(&self) -> &dyn StatusCache {
        self.status.as_ref()
    }

    pub fn dedup(&self) -> &dyn DedupCache {
        self.dedup.as_ref()
    }

    pub fn snapshots(&self) -> &dyn SnapshotStore {
        self.snapshots.as_ref()
    }

    /// Run one pass over a fresh snapshot.
    pub async fn run_pass(&self) -> Result<PassReport> {
        let mut pass = Pass::begin();
        header("Availability pass");

        step(1, STEPS, "Snapshot - Listing catalog");
        self.status.ping().await?;
        self.dedup.ping().await?;
        let items = dedupe_snapshot(self.catalog.list_all_items().await?);
        let previous = self.snapshots.load_catalog().await?;
        let held = self.snapshots.load_held().await?;
        let accepted = previous.as_ref().map(|s| s.items.len());
        match self
            .guard
            .admit(items.len(), accepted, held.as_ref().map(|h| h.count))
        {
            Ok(Verdict::Confirmed(_)) => sub_item("Shrink confirmed by consecutive passes"),
            Ok(_) => {}
            Err(e) => {
                self.snapshots
                    .save_held(Some(&HeldSnapshot::new(items.len())))
                    .await?;
                return Err(e);
            }
        }

        step(2, STEPS, "Detect - Comparing with status cache");
        let detector = ChangeDetector::new(self.status.as_ref());
        let detection = detector.detect(&items).await?;
        let existence = existence_diff(previous.as_ref(), &items);
        pass.admin.record_existence(&existence);
        pass.admin.record_transitions(&detection.transitions);
        sub_item(&format!(
            "{} items: {} transitions, {} first seen, {} added, {} removed",
            items.len(),
            detection.transitions.len(),
            detection.bootstrapped,
            existence.added.len(),
            existence.removed.len()
        ));

        step(3, STEPS, "Match - Evaluating watch rules");
        let view = SubscriptionView::build(
            self.index.list_subscribers().await?,
            self.index.list_watch_rules().await?,
        );
        let admins = self.index.list_admins().await?;
        let matches = Matcher::new(&view, &items).match_all(&detection.transitions);
        let dedup = Deduplicator::new(self.dedup.as_ref(), self.dedup_ttl);
        let screened = dedup.screen(matches).await?;
        let mut suppressed_similar = screened.suppressed;
        sub_item(&format!(
            "{} matches across {} of {} subscribers ({} suppressed)",
            screened.matches.len(),
            screened.subscriber_count(),
            view.len(),
            suppressed_similar
        ));

        step(4, STEPS, "Commit - Writing status cache");
        let written = detector.commit(&detection).await?;
        self.snapshots
            .save_catalog(&CatalogSnapshot::new(
                items.iter().map(|item| item.id.clone()).collect(),
            ))
            .await?;
        if held.is_some() {
            self.snapshots.save_held(None).await?;
        }
        sub_item(&format!("{} status entries written", written));

        step(5, STEPS, "Dispatch - Sending batches");
        let mut batcher = Batcher::new();
        for mut m in screened.matches {
            if let Err(e) = dedup.record(&m).await {
                // Status is already committed; deliver the direct part only
                log::warn!(
                    "Dedup write failed for {} / {}: {}",
                    m.subscriber.id,
                    m.item.id,
                    e
                );
                m.drop_similar();
                suppressed_similar += 1;
            }
            batcher.add(m);
        }
        let change_records = batcher.record_count();
        let batches = batcher.finish();
        let matched_subscribers = batches.len();
        let dispatch = self.dispatcher.dispatch_all(batches).await;

        let admin_summaries_sent = AdminFanout::new(self.admin_sink.as_ref(), self.channel_timeout)
            .flush(&mut pass.admin, &admins)
            .await;

        let report = PassReport {
            started_at: pass.started_at,
            finished_at: Utc::now(),
            items: items.len(),
            bootstrapped: detection.bootstrapped,
            transitions: detection.transitions.len(),
            added: existence.added.len(),
            removed: existence.removed.len(),
            matched_subscribers,
            change_records,
            suppressed_similar,
            dispatch,
            admin_summaries_sent,
        };
        report.log_summary();
        Ok(report)
    }
}
