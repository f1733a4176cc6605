//! Existence diff between catalog snapshots.
//!
//! Computes which item identities appeared or disappeared since the previous
//! successful pass. Removal is reported to administrators only; it never
//! touches the status cache.

use std::collections::HashSet;

use crate::models::{Item, ItemId};
use crate::storage::CatalogSnapshot;

/// Identities added and removed since the previous snapshot.
#[derive(Debug, Clone, Default)]
pub struct ExistenceDiff {
    /// Items in the current snapshot but not the previous one
    pub added: Vec<Item>,
    /// Identities in the previous snapshot but not the current one
    pub removed: Vec<ItemId>,
    /// No previous snapshot existed
    pub cold_start: bool,
}

impl ExistenceDiff {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

/// Calculate the existence diff. Without a previous snapshot nothing counts
/// as added.
pub fn existence_diff(previous: Option<&CatalogSnapshot>, current: &[Item]) -> ExistenceDiff {
    let Some(previous) = previous else {
        return ExistenceDiff {
            cold_start: true,
            ..ExistenceDiff::default()
        };
    };

    let prev_ids: HashSet<&ItemId> = previous.items.iter().collect();
    let curr_ids: HashSet<&ItemId> = current.iter().map(|item| &item.id).collect();

    // Added: in current but not in previous
    let added: Vec<Item> = current
        .iter()
        .filter(|item| !prev_ids.contains(&item.id))
        .cloned()
        .collect();

    // Removed: in previous but not in current
    let removed: Vec<ItemId> = previous
        .items
        .iter()
        .filter(|id| !curr_ids.contains(id))
        .cloned()
        .collect();

    ExistenceDiff {
        added,
        removed,
        cold_start: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::item;

    fn snapshot(ids: &[&str]) -> CatalogSnapshot {
        CatalogSnapshot::new(ids.iter().map(|id| ItemId::from(*id)).collect())
    }

    #[test]
    fn test_no_changes() {
        let prev = snapshot(&["001", "002"]);
        let curr = vec![item("001", true), item("002", false)];

        let result = existence_diff(Some(&prev), &curr);
        assert!(!result.has_changes());
        assert_eq!(result.change_count(), 0);
    }

    #[test]
    fn test_mixed_changes() {
        let prev = snapshot(&["001", "002", "003"]);
        let curr = vec![item("001", true), item("002", true), item("004", false)];

        let result = existence_diff(Some(&prev), &curr);
        assert_eq!(result.added.len(), 1);
        assert_eq!(result.added[0].id.as_str(), "004");
        assert_eq!(result.removed, vec![ItemId::from("003")]);
    }

    #[test]
    fn test_cold_start_adds_nothing() {
        let curr = vec![item("001", true)];
        let result = existence_diff(None, &curr);
        assert!(result.cold_start);
        assert!(!result.has_changes());
    }

    #[test]
    fn test_full_to_empty() {
        let prev = snapshot(&["001"]);
        let result = existence_diff(Some(&prev), &[]);
        assert!(result.added.is_empty());
        assert_eq!(result.removed.len(), 1);
    }
}
