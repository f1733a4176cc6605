//! Change detection against the status cache.
//!
//! Detection only reads the cache. The resulting writes are held in the
//! `Detection` and committed separately, after everything else that could
//! abort the pass on a cache failure has run, and before any dispatch.

use std::collections::HashSet;

use crate::error::Result;
use crate::models::{Direction, Item, ItemId, Transition};
use crate::storage::StatusCache;

/// Outcome of diffing one snapshot against the status cache.
#[derive(Debug, Default)]
pub struct Detection {
    /// State flips of this pass
    pub transitions: Vec<Transition>,
    /// Items observed for the first time
    pub bootstrapped: usize,
    /// Items whose state matched the cache
    pub unchanged: usize,
    pending: Vec<(ItemId, bool)>,
}

impl Detection {
    /// Cache writes this detection will commit.
    pub fn pending_writes(&self) -> &[(ItemId, bool)] {
        &self.pending
    }
}

pub struct ChangeDetector<'a> {
    cache: &'a dyn StatusCache,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(cache: &'a dyn StatusCache) -> Self {
        Self { cache }
    }

    /// Compare every item with its cached state.
    pub async fn detect(&self, items: &[Item]) -> Result<Detection> {
        let mut detection = Detection::default();

        for item in items {
            match self.cache.get(&item.id).await? {
                None => {
                    detection.bootstrapped += 1;
                    detection.pending.push((item.id.clone(), item.open));
                }
                Some(previous) => match Direction::between(previous, item.open) {
                    None => detection.unchanged += 1,
                    Some(direction) => {
                        log::debug!("Transition: {} {}", item.id, direction);
                        detection.pending.push((item.id.clone(), item.open));
                        detection.transitions.push(Transition {
                            item: item.clone(),
                            direction,
                        });
                    }
                },
            }
        }

        Ok(detection)
    }

    /// Write the detected states to the cache.
    pub async fn commit(&self, detection: &Detection) -> Result<usize> {
        self.cache.set_many(&detection.pending).await?;
        Ok(detection.pending.len())
    }
}

/// Drop repeated identities from a snapshot, keeping the first occurrence.
pub fn dedupe_snapshot(items: Vec<Item>) -> Vec<Item> {
    let mut seen = HashSet::new();
    let before = items.len();
    let deduped: Vec<Item> = items
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect();
    if deduped.len() != before {
        log::warn!(
            "Snapshot contained {} duplicate item identities",
            before - deduped.len()
        );
    }
    deduped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::item;
    use crate::storage::MemoryStatusCache;

    #[tokio::test]
    async fn test_first_observation_bootstraps_silently() {
        let cache = MemoryStatusCache::new();
        let detector = ChangeDetector::new(&cache);
        let items = vec![item("A", true), item("B", false)];

        let detection = detector.detect(&items).await.unwrap();
        assert!(detection.transitions.is_empty());
        assert_eq!(detection.bootstrapped, 2);

        detector.commit(&detection).await.unwrap();
        assert_eq!(cache.get(&"A".into()).await.unwrap(), Some(true));
        assert_eq!(cache.get(&"B".into()).await.unwrap(), Some(false));
    }

    #[tokio::test]
    async fn test_steady_state_emits_nothing() {
        let cache = MemoryStatusCache::with_entries([("A".into(), true), ("B".into(), false)]);
        let detector = ChangeDetector::new(&cache);
        let items = vec![item("A", true), item("B", false)];

        for _ in 0..3 {
            let detection = detector.detect(&items).await.unwrap();
            assert!(detection.transitions.is_empty());
            assert_eq!(detection.unchanged, 2);
            assert!(detection.pending_writes().is_empty());
            detector.commit(&detection).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_flip_emits_transition() {
        let cache = MemoryStatusCache::with_entries([("A".into(), false), ("B".into(), true)]);
        let detector = ChangeDetector::new(&cache);
        let items = vec![item("A", true), item("B", false)];

        let detection = detector.detect(&items).await.unwrap();
        assert_eq!(detection.transitions.len(), 2);
        assert_eq!(detection.transitions[0].direction, Direction::Opened);
        assert_eq!(detection.transitions[1].direction, Direction::Closed);

        // detection alone does not touch the cache
        assert_eq!(cache.get(&"A".into()).await.unwrap(), Some(false));

        detector.commit(&detection).await.unwrap();
        assert_eq!(cache.get(&"A".into()).await.unwrap(), Some(true));

        let again = detector.detect(&items).await.unwrap();
        assert!(again.transitions.is_empty());
    }

    #[test]
    fn test_dedupe_snapshot_keeps_first() {
        let items = dedupe_snapshot(vec![item("A", true), item("A", false), item("B", true)]);
        assert_eq!(items.len(), 2);
        assert!(items[0].open);
    }
}
