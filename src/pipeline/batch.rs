//! Per-subscriber batching.
//!
//! Within one pass every subscriber gets at most one batch, and every item
//! appears at most once per batch. Triggers from several rules are merged
//! into the same record.

use std::collections::BTreeMap;
use std::fmt;

use crate::models::{ChangeRecord, Subscriber, SubscriberId};
use crate::pipeline::matcher::Match;

/// Lifecycle of a batch within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Collecting,
    Ready,
    Dispatching,
    Done,
}

impl BatchState {
    fn next(self) -> Option<Self> {
        match self {
            BatchState::Collecting => Some(BatchState::Ready),
            BatchState::Ready => Some(BatchState::Dispatching),
            BatchState::Dispatching => Some(BatchState::Done),
            BatchState::Done => None,
        }
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchState::Collecting => "collecting",
            BatchState::Ready => "ready",
            BatchState::Dispatching => "dispatching",
            BatchState::Done => "done",
        };
        f.write_str(s)
    }
}

/// All change records of one subscriber for one pass.
#[derive(Debug, Clone)]
pub struct SubscriberBatch {
    subscriber: Subscriber,
    records: Vec<ChangeRecord>,
    state: BatchState,
}

impl SubscriberBatch {
    fn new(subscriber: Subscriber) -> Self {
        Self {
            subscriber,
            records: Vec::new(),
            state: BatchState::Collecting,
        }
    }

    pub fn subscriber(&self) -> &Subscriber {
        &self.subscriber
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Move to the next state. Out-of-order calls are ignored.
    pub fn advance(&mut self) -> BatchState {
        match self.state.next() {
            Some(next) => self.state = next,
            None => log::warn!("Batch for {} already done", self.subscriber.id),
        }
        self.state
    }

    fn add(&mut self, m: Match) {
        debug_assert_eq!(self.state, BatchState::Collecting);
        let triggers = m.triggers();
        match self.records.iter_mut().find(|r| r.item.id == m.item.id) {
            Some(existing) => existing.merge(triggers),
            None => self
                .records
                .push(ChangeRecord::new(m.item, m.direction, triggers)),
        }
    }
}

/// Collects matches into one batch per subscriber.
#[derive(Debug, Default)]
pub struct Batcher {
    batches: BTreeMap<SubscriberId, SubscriberBatch>,
}

impl Batcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, m: Match) {
        if m.is_empty() {
            return;
        }
        self.batches
            .entry(m.subscriber.id.clone())
            .or_insert_with(|| SubscriberBatch::new(m.subscriber.clone()))
            .add(m);
    }

    /// Number of change records across all batches.
    pub fn record_count(&self) -> usize {
        self.batches.values().map(SubscriberBatch::len).sum()
    }

    /// Seal every non-empty batch as ready for dispatch.
    pub fn finish(self) -> Vec<SubscriberBatch> {
        self.batches
            .into_values()
            .filter(|batch| !batch.is_empty())
            .map(|mut batch| {
                batch.advance();
                batch
            })
            .collect()
    }
}
