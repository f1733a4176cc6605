//! Administrator summaries.
//!
//! Catalog-wide events of one pass are collected in an accumulator owned by
//! that pass and flushed once at its end. A pass that aborts drops its
//! accumulator, so nothing leaks into the next one.

use std::mem;
use std::time::Duration;

use crate::channels::AdminSink;
use crate::error::ChannelError;
use crate::models::{Admin, AdminSummary, CatalogEvent, Transition};
use crate::pipeline::diff::ExistenceDiff;

/// Catalog events of the running pass.
#[derive(Debug, Default)]
pub struct AdminAccumulator {
    summary: AdminSummary,
}

impl AdminAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: CatalogEvent) {
        match event {
            CatalogEvent::Added(item) => self.summary.added.push(item),
            CatalogEvent::Opened(item) => self.summary.opened.push(item),
            CatalogEvent::Closed(item) => self.summary.closed.push(item),
            CatalogEvent::Removed(id) => self.summary.removed.push(id),
        }
    }

    pub fn record_existence(&mut self, diff: &ExistenceDiff) {
        for item in &diff.added {
            self.record(CatalogEvent::Added(item.clone()));
        }
        for id in &diff.removed {
            self.record(CatalogEvent::Removed(id.clone()));
        }
    }

    pub fn record_transitions(&mut self, transitions: &[Transition]) {
        for t in transitions {
            self.record(t.into());
        }
    }

    pub fn len(&self) -> usize {
        self.summary.total()
    }

    pub fn is_empty(&self) -> bool {
        self.summary.is_empty()
    }

    pub fn summary(&self) -> &AdminSummary {
        &self.summary
    }

    /// Take the collected summary, leaving the accumulator empty.
    pub fn take(&mut self) -> AdminSummary {
        mem::take(&mut self.summary)
    }
}

/// Sends one summary to each opted-in administrator.
pub struct AdminFanout<'a> {
    sink: &'a dyn AdminSink,
    timeout: Duration,
}

impl<'a> AdminFanout<'a> {
    pub fn new(sink: &'a dyn AdminSink, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    /// Flush and clear the accumulator. Returns the number of summaries sent.
    /// Nothing is sent for a pass without events.
    pub async fn flush(&self, accumulator: &mut AdminAccumulator, admins: &[Admin]) -> usize {
        let summary = accumulator.take();
        if summary.is_empty() {
            log::debug!("No catalog events, skipping admin summary");
            return 0;
        }

        let mut sent = 0;
        for admin in admins {
            let Some(to) = admin.summary_address() else {
                continue;
            };
            let result = tokio::time::timeout(
                self.timeout,
                self.sink.send_summary(admin, to, &summary),
            )
            .await
            .unwrap_or_else(|_| Err(ChannelError::Timeout(self.timeout.as_millis() as u64)));

            match result {
                Ok(()) => sent += 1,
                Err(e) => log::warn!("Admin summary to {} failed: {}", admin.id, e),
            }
        }

        log::info!(
            "Admin summary: {} events sent to {} admins",
            summary.total(),
            sent
        );
        sent
    }
}
