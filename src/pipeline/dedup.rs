//! Similar-item deduplication.
//!
//! Only similar-item matches are deduplicated; a direct watch always
//! notifies. The screen reads the dedup cache during matching. Keys are
//! recorded later, once the status cache commit succeeded, right before a
//! record enters its batch.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::Result;
use crate::pipeline::matcher::Match;
use crate::storage::DedupCache;

/// Matches left after screening.
#[derive(Debug, Default)]
pub struct Screened {
    pub matches: Vec<Match>,
    /// Matches whose similar triggers were dropped
    pub suppressed: usize,
}

impl Screened {
    /// Distinct subscribers with at least one surviving match.
    pub fn subscriber_count(&self) -> usize {
        self.matches
            .iter()
            .map(|m| &m.subscriber.id)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

pub struct Deduplicator<'a> {
    cache: &'a dyn DedupCache,
    ttl: Duration,
}

impl<'a> Deduplicator<'a> {
    pub fn new(cache: &'a dyn DedupCache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Drop similar triggers already notified within the TTL. A match with no
    /// trigger left is discarded.
    pub async fn screen(&self, matches: Vec<Match>) -> Result<Screened> {
        let mut screened = Screened::default();

        for mut m in matches {
            if m.is_similar() && self.cache.exists(&m.subscriber.id, &m.item.id).await? {
                log::debug!(
                    "Suppressing repeated similar match {} for {}",
                    m.item.id,
                    m.subscriber.id
                );
                m.drop_similar();
                screened.suppressed += 1;
            }
            if !m.is_empty() {
                screened.matches.push(m);
            }
        }

        Ok(screened)
    }

    /// Record the key for a surviving similar match.
    pub async fn record(&self, m: &Match) -> Result<()> {
        if m.is_similar() {
            self.cache
                .set_with_ttl(&m.subscriber.id, &m.item.id, self.ttl)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, TriggerSource};
    use crate::pipeline::test_support::{item, subscriber};
    use crate::storage::MemoryDedupCache;

    fn similar_match(sub: &str, id: &str, direct: bool) -> Match {
        Match {
            subscriber: subscriber(sub),
            item: item(id, true),
            direction: Direction::Opened,
            direct,
            similar: BTreeSet::from([TriggerSource::SimilarCourse]),
        }
    }

    #[tokio::test]
    async fn test_first_similar_match_passes_then_suppressed() {
        let cache = MemoryDedupCache::new();
        let dedup = Deduplicator::new(&cache, Duration::from_secs(3600));

        let screened = dedup.screen(vec![similar_match("s1", "B", false)]).await.unwrap();
        assert_eq!(screened.matches.len(), 1);
        dedup.record(&screened.matches[0]).await.unwrap();

        let again = dedup.screen(vec![similar_match("s1", "B", false)]).await.unwrap();
        assert!(again.matches.is_empty());
        assert_eq!(again.suppressed, 1);
    }

    #[tokio::test]
    async fn test_direct_trigger_survives_suppression() {
        let cache = MemoryDedupCache::new();
        cache
            .set_with_ttl(&"s1".into(), &"B".into(), Duration::from_secs(3600))
            .await
            .unwrap();
        let dedup = Deduplicator::new(&cache, Duration::from_secs(3600));

        let screened = dedup.screen(vec![similar_match("s1", "B", true)]).await.unwrap();
        assert_eq!(screened.matches.len(), 1);
        assert!(screened.matches[0].direct);
        assert!(!screened.matches[0].is_similar());
    }

    #[tokio::test]
    async fn test_keys_are_per_subscriber() {
        let cache = MemoryDedupCache::new();
        let dedup = Deduplicator::new(&cache, Duration::from_secs(3600));
        dedup.record(&similar_match("s1", "B", false)).await.unwrap();

        let screened = dedup.screen(vec![similar_match("s2", "B", false)]).await.unwrap();
        assert_eq!(screened.matches.len(), 1);
    }

    #[tokio::test]
    async fn test_subscriber_count_is_distinct() {
        let cache = MemoryDedupCache::new();
        let dedup = Deduplicator::new(&cache, Duration::from_secs(3600));

        let screened = dedup
            .screen(vec![
                similar_match("s1", "A", false),
                similar_match("s1", "B", false),
                similar_match("s2", "A", false),
            ])
            .await
            .unwrap();
        assert_eq!(screened.matches.len(), 3);
        assert_eq!(screened.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_direct_only_match_records_nothing() {
        let cache = MemoryDedupCache::new();
        let dedup = Deduplicator::new(&cache, Duration::from_secs(3600));
        let mut m = similar_match("s1", "A", true);
        m.drop_similar();

        dedup.record(&m).await.unwrap();
        assert_eq!(cache.live_keys().await.unwrap(), 0);
    }
}
