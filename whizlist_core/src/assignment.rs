//! List membership changes picked in the list selector.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::ListId;

/// What to add and remove to turn the current membership into the selection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListChanges {
    pub to_add: BTreeSet<ListId>,
    pub to_remove: BTreeSet<ListId>,
}

impl ListChanges {
    pub fn diff(current: &BTreeSet<ListId>, selected: &BTreeSet<ListId>) -> Self {
        Self {
            to_add: selected.difference(current).copied().collect(),
            to_remove: current.difference(selected).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Number of backend calls needed to apply the changes.
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }
}

/// The lists ticked in an open selector.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSelection {
    selected: BTreeSet<ListId>,
}

impl ListSelection {
    pub fn new(selected: impl IntoIterator<Item = ListId>) -> Self {
        Self {
            selected: selected.into_iter().collect(),
        }
    }

    /// Flips one list. Returns whether it is selected afterwards.
    pub fn toggle(&mut self, list_id: ListId) -> bool {
        if self.selected.remove(&list_id) {
            false
        } else {
            self.selected.insert(list_id);
            true
        }
    }

    pub fn select(&mut self, list_id: ListId) {
        self.selected.insert(list_id);
    }

    pub fn is_selected(&self, list_id: &ListId) -> bool {
        self.selected.contains(list_id)
    }

    pub fn selected(&self) -> &BTreeSet<ListId> {
        &self.selected
    }

    pub fn changes_from(&self, current: &BTreeSet<ListId>) -> ListChanges {
        ListChanges::diff(current, &self.selected)
    }
}
