//! Local item-status map that poll deltas are merged into.

use super::status::ItemStatus;
use serde::Serialize;
use std::collections::BTreeMap;

/// One observed transition of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemChange {
    pub item_id: String,
    /// `None` when the item was not tracked before this change.
    pub previous: Option<ItemStatus>,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ItemStatusMap {
    items: BTreeMap<String, ItemStatus>,
    adopt_new: bool,
}

impl ItemStatusMap {
    /// Empty map that starts tracking items as updates mention them.
    pub fn adopting() -> Self {
        Self {
            items: BTreeMap::new(),
            adopt_new: true,
        }
    }

    /// Map seeded with a fixed item set. Updates for other items are
    /// ignored. An empty seed falls back to adopting.
    pub fn tracking<I, S>(seed: I) -> Self
    where
        I: IntoIterator<Item = (S, ItemStatus)>,
        S: Into<String>,
    {
        let items: BTreeMap<String, ItemStatus> =
            seed.into_iter().map(|(id, status)| (id.into(), status)).collect();
        let adopt_new = items.is_empty();
        Self { items, adopt_new }
    }

    /// Merge one item status. Returns the change if the status moved.
    pub fn merge(
        &mut self,
        item_id: &str,
        status: ItemStatus,
        file_id: Option<String>,
    ) -> Option<ItemChange> {
        match self.items.get_mut(item_id) {
            Some(current) => {
                if *current == status || !current.accepts(status) {
                    return None;
                }
                let previous = *current;
                *current = status;
                Some(ItemChange {
                    item_id: item_id.to_string(),
                    previous: Some(previous),
                    status,
                    file_id,
                })
            }
            None if self.adopt_new => {
                self.items.insert(item_id.to_string(), status);
                Some(ItemChange {
                    item_id: item_id.to_string(),
                    previous: None,
                    status,
                    file_id,
                })
            }
            None => None,
        }
    }

    /// Force every item still in progress to `timeout`.
    pub fn time_out_in_progress(&mut self) -> Vec<ItemChange> {
        self.items
            .iter_mut()
            .filter(|(_, status)| !status.is_finished())
            .map(|(item_id, status)| {
                let previous = *status;
                *status = ItemStatus::Timeout;
                ItemChange {
                    item_id: item_id.clone(),
                    previous: Some(previous),
                    status: ItemStatus::Timeout,
                    file_id: None,
                }
            })
            .collect()
    }

    pub fn get(&self, item_id: &str) -> Option<ItemStatus> {
        self.items.get(item_id).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn all_finished(&self) -> bool {
        self.items.values().all(|s| s.is_finished())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ItemStatus)> {
        self.items.iter().map(|(id, status)| (id.as_str(), *status))
    }

    pub fn snapshot(&self) -> BTreeMap<String, ItemStatus> {
        self.items.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_ignores_unknown_items() {
        let mut map = ItemStatusMap::tracking([("a", ItemStatus::Running)]);
        assert!(map.merge("b", ItemStatus::Done, None).is_none());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_empty_seed_adopts() {
        let mut map = ItemStatusMap::tracking(Vec::<(String, ItemStatus)>::new());
        let change = map.merge("b", ItemStatus::Running, None).unwrap();
        assert_eq!(change.previous, None);
        assert_eq!(map.get("b"), Some(ItemStatus::Running));
    }

    #[test]
    fn test_merge_reports_only_real_changes() {
        let mut map = ItemStatusMap::tracking([("a", ItemStatus::Pending)]);
        let change = map.merge("a", ItemStatus::Running, None).unwrap();
        assert_eq!(change.previous, Some(ItemStatus::Pending));
        assert!(map.merge("a", ItemStatus::Running, None).is_none());
    }

    #[test]
    fn test_replayed_update_does_not_regress() {
        let mut map = ItemStatusMap::tracking([("a", ItemStatus::Running)]);
        map.merge("a", ItemStatus::Done, Some("f2".into())).unwrap();
        assert!(map.merge("a", ItemStatus::Running, None).is_none());
        assert!(map.merge("a", ItemStatus::Done, None).is_none());
        assert_eq!(map.get("a"), Some(ItemStatus::Done));
    }

    #[test]
    fn test_time_out_in_progress_leaves_finished_items() {
        let mut map = ItemStatusMap::tracking([
            ("a", ItemStatus::Done),
            ("b", ItemStatus::Running),
            ("c", ItemStatus::Pending),
            ("d", ItemStatus::Error),
        ]);
        let changes = map.time_out_in_progress();
        let ids: Vec<&str> = changes.iter().map(|c| c.item_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(changes[0].previous, Some(ItemStatus::Running));
        assert_eq!(map.get("a"), Some(ItemStatus::Done));
        assert_eq!(map.get("b"), Some(ItemStatus::Timeout));
        assert!(map.all_finished());

        // Second call is a no-op
        assert!(map.time_out_in_progress().is_empty());
    }
}
