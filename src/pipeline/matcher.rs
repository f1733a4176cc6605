//! Subscription matching.
//!
//! Joins watch rules to their subscribers, then evaluates each transition
//! against every subscriber:
//!
//! - Direct: the subscriber watches the item and wants that direction
//! - Similar: on opened only, the item shares a grouping key with a watched
//!   item whose rule opted in, and the rule's filters accept it
//!
//! One `Match` is produced per (subscriber, item) carrying every trigger.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::models::{
    ChangeRecord, Direction, Item, ItemId, Subscriber, SubscriberId, Transition, TriggerSource,
    WatchRule,
};

/// A subscriber together with its rules.
#[derive(Debug, Clone)]
pub struct Watcher {
    pub subscriber: Subscriber,
    pub rules: Vec<WatchRule>,
}

/// Subscribers joined with their watch rules.
#[derive(Debug, Default)]
pub struct SubscriptionView {
    watchers: BTreeMap<SubscriberId, Watcher>,
    orphaned: usize,
}

impl SubscriptionView {
    /// Join rules to subscribers. Rules whose subscriber no longer exists are
    /// skipped with a warning.
    pub fn build(subscribers: Vec<Subscriber>, rules: Vec<WatchRule>) -> Self {
        let mut watchers: BTreeMap<SubscriberId, Watcher> = subscribers
            .into_iter()
            .map(|subscriber| {
                (
                    subscriber.id.clone(),
                    Watcher {
                        subscriber,
                        rules: Vec::new(),
                    },
                )
            })
            .collect();

        let mut orphaned = 0;
        for rule in rules {
            match watchers.get_mut(&rule.subscriber_id) {
                Some(watcher) => watcher.rules.push(rule),
                None => {
                    log::warn!(
                        "Skipping rule {}: subscriber {} not found",
                        rule.id,
                        rule.subscriber_id
                    );
                    orphaned += 1;
                }
            }
        }

        Self { watchers, orphaned }
    }

    pub fn get(&self, id: &SubscriberId) -> Option<&Watcher> {
        self.watchers.get(id)
    }

    pub fn watchers(&self) -> impl Iterator<Item = &Watcher> {
        self.watchers.values()
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Rules skipped for lack of a subscriber.
    pub fn orphaned(&self) -> usize {
        self.orphaned
    }
}

/// A transition matched to one subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub subscriber: Subscriber,
    pub item: Item,
    pub direction: Direction,
    /// Subscriber watches this item directly
    pub direct: bool,
    /// Similar-item triggers; empty when not matched as similar
    pub similar: BTreeSet<TriggerSource>,
}

impl Match {
    pub fn is_similar(&self) -> bool {
        !self.similar.is_empty()
    }

    /// No trigger left.
    pub fn is_empty(&self) -> bool {
        !self.direct && self.similar.is_empty()
    }

    /// Remove the similar-item triggers, keeping any direct one.
    pub fn drop_similar(&mut self) {
        self.similar.clear();
    }

    pub fn triggers(&self) -> BTreeSet<TriggerSource> {
        let mut triggers = self.similar.clone();
        if self.direct {
            triggers.insert(TriggerSource::DirectWatch);
        }
        triggers
    }

    pub fn into_record(self) -> ChangeRecord {
        let triggers = self.triggers();
        ChangeRecord::new(self.item, self.direction, triggers)
    }
}

/// Matches transitions against a subscription view.
pub struct Matcher<'a> {
    view: &'a SubscriptionView,
    /// Grouping key of every item in the current snapshot
    groups: HashMap<&'a ItemId, &'a str>,
}

impl<'a> Matcher<'a> {
    pub fn new(view: &'a SubscriptionView, snapshot: &'a [Item]) -> Self {
        let groups = snapshot
            .iter()
            .map(|item| (&item.id, item.grouping_key.as_str()))
            .collect();
        Self { view, groups }
    }

    /// All subscribers matched by one transition.
    pub fn match_transition(&self, transition: &Transition) -> Vec<Match> {
        self.view
            .watchers()
            .filter_map(|watcher| self.match_watcher(watcher, transition))
            .collect()
    }

    pub fn match_all(&self, transitions: &[Transition]) -> Vec<Match> {
        transitions
            .iter()
            .flat_map(|t| self.match_transition(t))
            .collect()
    }

    fn match_watcher(&self, watcher: &Watcher, transition: &Transition) -> Option<Match> {
        let subscriber = &watcher.subscriber;
        let item = &transition.item;

        let direct = subscriber.toggles.wants(transition.direction)
            && watcher.rules.iter().any(|rule| rule.watches(&item.id));

        let mut similar = BTreeSet::new();
        if transition.direction == Direction::Opened && subscriber.toggles.on_similar {
            for rule in &watcher.rules {
                if let Some(triggers) = self.similar_triggers(rule, item) {
                    similar.extend(triggers);
                }
            }
        }

        if !direct && similar.is_empty() {
            return None;
        }

        Some(Match {
            subscriber: subscriber.clone(),
            item: item.clone(),
            direction: transition.direction,
            direct,
            similar,
        })
    }

    /// Triggers one rule contributes for a similar item, if any.
    fn similar_triggers(&self, rule: &WatchRule, item: &Item) -> Option<Vec<TriggerSource>> {
        if !rule.notify_similar || rule.watches(&item.id) {
            return None;
        }

        // Watched item missing from the snapshot: no group to compare
        let group = self.groups.get(&rule.item)?;
        if !item.shares_group(group) || !rule.accepts_schedule(item) {
            return None;
        }

        if rule.newly_opened_only {
            if !rule.admits_newly_opened(item) {
                return None;
            }
            return Some(vec![
                TriggerSource::SimilarCourse,
                TriggerSource::NewlyOpened,
            ]);
        }

        Some(vec![TriggerSource::SimilarCourse])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FilterRule, Schedule};
    use crate::pipeline::test_support::{item, item_in, rule, similar_rule, subscriber};
    use chrono::{Duration, Utc};

    fn opened(item: Item) -> Transition {
        Transition {
            item,
            direction: Direction::Opened,
        }
    }

    fn closed(item: Item) -> Transition {
        Transition {
            item,
            direction: Direction::Closed,
        }
    }

    #[test]
    fn test_orphaned_rules_are_skipped() {
        let view = SubscriptionView::build(
            vec![subscriber("s1")],
            vec![rule("r1", "s1", "A"), rule("r2", "ghost", "A")],
        );
        assert_eq!(view.len(), 1);
        assert_eq!(view.orphaned(), 1);
        assert_eq!(view.get(&"s1".into()).unwrap().rules.len(), 1);
    }

    #[test]
    fn test_direct_match_on_open() {
        let snapshot = vec![item("A", true)];
        let view = SubscriptionView::build(vec![subscriber("s1")], vec![rule("r1", "s1", "A")]);
        let matcher = Matcher::new(&view, &snapshot);

        let matches = matcher.match_transition(&opened(item("A", true)));
        assert_eq!(matches.len(), 1);
        assert!(matches[0].direct);
        assert!(!matches[0].is_similar());
        assert_eq!(
            matches[0].triggers(),
            BTreeSet::from([TriggerSource::DirectWatch])
        );
    }

    #[test]
    fn test_direct_match_respects_close_toggle() {
        let snapshot = vec![item("A", false)];
        let view = SubscriptionView::build(vec![subscriber("s1")], vec![rule("r1", "s1", "A")]);
        let matcher = Matcher::new(&view, &snapshot);

        // on_close defaults to off
        assert!(matcher.match_transition(&closed(item("A", false))).is_empty());

        let mut s = subscriber("s2");
        s.toggles.on_close = true;
        let view = SubscriptionView::build(vec![s], vec![rule("r2", "s2", "A")]);
        let matcher = Matcher::new(&view, &snapshot);
        assert_eq!(matcher.match_transition(&closed(item("A", false))).len(), 1);
    }

    #[test]
    fn test_similar_match_shares_group() {
        let snapshot = vec![item_in("A", "G", false), item_in("B", "G", true)];
        let view = SubscriptionView::build(
            vec![subscriber("s1")],
            vec![similar_rule("r1", "s1", "A", vec![])],
        );
        let matcher = Matcher::new(&view, &snapshot);

        let matches = matcher.match_transition(&opened(item_in("B", "G", true)));
        assert_eq!(matches.len(), 1);
        assert!(!matches[0].direct);
        assert!(matches[0].similar.contains(&TriggerSource::SimilarCourse));

        // Different group: no match
        let other = matcher.match_transition(&opened(item_in("C", "H", true)));
        assert!(other.is_empty());
    }

    #[test]
    fn test_similar_never_fires_on_close() {
        let mut s = subscriber("s1");
        s.toggles.on_close = true;
        let snapshot = vec![item_in("A", "G", false), item_in("B", "G", false)];
        let view = SubscriptionView::build(vec![s], vec![similar_rule("r1", "s1", "A", vec![])]);
        let matcher = Matcher::new(&view, &snapshot);

        assert!(matcher.match_transition(&closed(item_in("B", "G", false))).is_empty());
    }

    #[test]
    fn test_similar_requires_both_toggles() {
        let snapshot = vec![item_in("A", "G", false), item_in("B", "G", true)];

        let view = SubscriptionView::build(vec![subscriber("s1")], vec![rule("r1", "s1", "A")]);
        let matcher = Matcher::new(&view, &snapshot);
        assert!(matcher.match_transition(&opened(item_in("B", "G", true))).is_empty());

        let mut s = subscriber("s2");
        s.toggles.on_similar = false;
        let view = SubscriptionView::build(vec![s], vec![similar_rule("r2", "s2", "A", vec![])]);
        let matcher = Matcher::new(&view, &snapshot);
        assert!(matcher.match_transition(&opened(item_in("B", "G", true))).is_empty());
    }

    #[test]
    fn test_similar_filters() {
        let mut b = item_in("B", "G", true);
        b.schedule = Some(Schedule::parse("Tue Thu 14:00-15:15").unwrap());
        let snapshot = vec![item_in("A", "G", false), b.clone()];

        let accepts = similar_rule(
            "r1",
            "s1",
            "A",
            vec![FilterRule::pattern("Tue Thu", &["14:00-15:15"]).unwrap()],
        );
        let view = SubscriptionView::build(vec![subscriber("s1")], vec![accepts]);
        assert_eq!(
            Matcher::new(&view, &snapshot)
                .match_transition(&opened(b.clone()))
                .len(),
            1
        );

        let rejects = similar_rule(
            "r1",
            "s1",
            "A",
            vec![FilterRule::pattern("Mon Wed", &["14:00-15:15"]).unwrap()],
        );
        let view = SubscriptionView::build(vec![subscriber("s1")], vec![rejects]);
        assert!(
            Matcher::new(&view, &snapshot)
                .match_transition(&opened(b))
                .is_empty()
        );
    }

    #[test]
    fn test_newly_opened_only() {
        let now = Utc::now();
        let mut rule_newly = similar_rule("r1", "s1", "A", vec![]);
        rule_newly.newly_opened_only = true;
        rule_newly.added_at = now;

        let mut fresh = item_in("B", "G", true);
        fresh.first_opened_at = Some(now + Duration::minutes(5));
        let mut stale = item_in("C", "G", true);
        stale.first_opened_at = Some(now - Duration::minutes(5));

        let snapshot = vec![item_in("A", "G", false), fresh.clone(), stale.clone()];
        let view = SubscriptionView::build(vec![subscriber("s1")], vec![rule_newly]);
        let matcher = Matcher::new(&view, &snapshot);

        let matches = matcher.match_transition(&opened(fresh));
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches[0].similar,
            BTreeSet::from([TriggerSource::SimilarCourse, TriggerSource::NewlyOpened])
        );
        assert!(matcher.match_transition(&opened(stale)).is_empty());
    }

    #[test]
    fn test_direct_and_similar_merge_into_one_match() {
        let snapshot = vec![item_in("A", "G", true), item_in("B", "G", false)];
        let view = SubscriptionView::build(
            vec![subscriber("s1")],
            vec![
                rule("r1", "s1", "A"),
                similar_rule("r2", "s1", "B", vec![]),
            ],
        );
        let matcher = Matcher::new(&view, &snapshot);

        let matches = matcher.match_transition(&opened(item_in("A", "G", true)));
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches[0].triggers(),
            BTreeSet::from([TriggerSource::DirectWatch, TriggerSource::SimilarCourse])
        );
    }
}
