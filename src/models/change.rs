//! Per-pass change data: transitions, change records, catalog events.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::item::{Item, ItemId};

/// Direction of a state flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Opened,
    Closed,
}

impl Direction {
    /// Direction of the flip from `previous` to `current`, if any.
    pub fn between(previous: bool, current: bool) -> Option<Self> {
        match (previous, current) {
            (false, true) => Some(Direction::Opened),
            (true, false) => Some(Direction::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Opened => "opened",
            Direction::Closed => "closed",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected state flip for one item within a single pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub item: Item,
    pub direction: Direction,
}

/// Why a change record exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    DirectWatch,
    SimilarCourse,
    NewlyOpened,
}

/// One change placed in one subscriber's batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
    pub item: Item,
    pub direction: Direction,
    pub triggers: BTreeSet<TriggerSource>,
}

impl ChangeRecord {
    pub fn new(
        item: Item,
        direction: Direction,
        triggers: impl IntoIterator<Item = TriggerSource>,
    ) -> Self {
        Self {
            item,
            direction,
            triggers: triggers.into_iter().collect(),
        }
    }

    /// Union trigger sources into this record.
    pub fn merge(&mut self, triggers: impl IntoIterator<Item = TriggerSource>) {
        self.triggers.extend(triggers);
    }

    pub fn has(&self, trigger: TriggerSource) -> bool {
        self.triggers.contains(&trigger)
    }
}

/// Kind of a catalog-wide event reported to administrators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Added,
    Opened,
    Closed,
    Removed,
}

/// One catalog-wide event of a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEvent {
    Added(Item),
    Opened(Item),
    Closed(Item),
    Removed(ItemId),
}

impl CatalogEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            CatalogEvent::Added(_) => EventKind::Added,
            CatalogEvent::Opened(_) => EventKind::Opened,
            CatalogEvent::Closed(_) => EventKind::Closed,
            CatalogEvent::Removed(_) => EventKind::Removed,
        }
    }
}

impl From<&Transition> for CatalogEvent {
    fn from(t: &Transition) -> Self {
        match t.direction {
            Direction::Opened => CatalogEvent::Opened(t.item.clone()),
            Direction::Closed => CatalogEvent::Closed(t.item.clone()),
        }
    }
}

/// Aggregate summary of one pass, partitioned by event kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdminSummary {
    pub added: Vec<Item>,
    pub opened: Vec<Item>,
    pub closed: Vec<Item>,
    pub removed: Vec<ItemId>,
}

impl AdminSummary {
    pub fn total(&self) -> usize {
        self.added.len() + self.opened.len() + self.closed.len() + self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
