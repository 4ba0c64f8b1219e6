// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeSet;

use crate::ids::RowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTarget {
    /// Every row matching the current query, not just the rows on this page.
    All,
    Row(RowId),
}

/// Rows an action runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionTargets {
    Ids(Vec<RowId>),
    AllMatching,
}

impl ActionTargets {
    pub fn single(id: RowId) -> Self {
        Self::Ids(vec![id])
    }

    pub fn ids(&self) -> &[RowId] {
        match self {
            Self::Ids(ids) => ids,
            Self::AllMatching => &[],
        }
    }

    pub fn is_all_matching(&self) -> bool {
        matches!(self, Self::AllMatching)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Ids(ids) => ids.is_empty(),
            Self::AllMatching => false,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::AllMatching => "all matching rows".to_owned(),
            Self::Ids(ids) if ids.len() == 1 => "1 row".to_owned(),
            Self::Ids(ids) => format!("{} rows", ids.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionState {
    ids: BTreeSet<RowId>,
    all_selected: bool,
}

impl SelectionState {
    pub fn toggle(&mut self, target: SelectionTarget) {
        match target {
            SelectionTarget::All => {
                self.all_selected = !self.all_selected;
                self.ids.clear();
            }
            SelectionTarget::Row(id) => {
                self.all_selected = false;
                if !self.ids.remove(&id) {
                    self.ids.insert(id);
                }
            }
        }
    }

    /// Selects every row on the page, or deselects them when all already are.
    pub fn toggle_page(&mut self, page: &[RowId]) {
        self.all_selected = false;
        if !page.is_empty() && page.iter().all(|id| self.ids.contains(id)) {
            for id in page {
                self.ids.remove(id);
            }
        } else {
            self.ids.extend(page.iter().copied());
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.all_selected = false;
    }

    pub fn all_selected(&self) -> bool {
        self.all_selected
    }

    pub fn selected_ids(&self) -> &BTreeSet<RowId> {
        &self.ids
    }

    pub fn is_selected(&self, id: RowId) -> bool {
        self.all_selected || self.ids.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        !self.all_selected && self.ids.is_empty()
    }

    pub fn targets(&self) -> ActionTargets {
        if self.all_selected {
            ActionTargets::AllMatching
        } else {
            ActionTargets::Ids(self.ids.iter().copied().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ActionTargets, SelectionState, SelectionTarget};
    use crate::ids::RowId;

    fn ids(values: &[i64]) -> Vec<RowId> {
        values.iter().copied().map(RowId::new).collect()
    }

    #[test]
    fn toggling_all_clears_explicit_ids() {
        let mut selection = SelectionState::default();
        selection.toggle(SelectionTarget::Row(RowId::new(3)));
        selection.toggle(SelectionTarget::Row(RowId::new(7)));

        selection.toggle(SelectionTarget::All);
        assert!(selection.all_selected());
        assert!(selection.selected_ids().is_empty());

        selection.toggle(SelectionTarget::All);
        assert!(!selection.all_selected());
        assert!(selection.selected_ids().is_empty());
        assert!(selection.is_empty());
    }

    #[test]
    fn row_toggle_while_all_selected_drops_all_first() {
        let mut selection = SelectionState::default();
        selection.toggle(SelectionTarget::All);
        selection.toggle(SelectionTarget::Row(RowId::new(5)));

        assert!(!selection.all_selected());
        assert_eq!(selection.targets(), ActionTargets::Ids(ids(&[5])));
    }

    #[test]
    fn row_toggle_is_symmetric() {
        let mut selection = SelectionState::default();
        selection.toggle(SelectionTarget::Row(RowId::new(1)));
        assert!(selection.is_selected(RowId::new(1)));
        selection.toggle(SelectionTarget::Row(RowId::new(1)));
        assert!(!selection.is_selected(RowId::new(1)));
    }

    #[test]
    fn page_toggle_selects_then_deselects_page_rows() {
        let mut selection = SelectionState::default();
        selection.toggle(SelectionTarget::Row(RowId::new(99)));

        let page = ids(&[1, 2, 3]);
        selection.toggle_page(&page);
        assert_eq!(selection.targets(), ActionTargets::Ids(ids(&[1, 2, 3, 99])));

        selection.toggle_page(&page);
        assert_eq!(selection.targets(), ActionTargets::Ids(ids(&[99])));
    }

    #[test]
    fn targets_report_all_matching_sentinel() {
        let mut selection = SelectionState::default();
        selection.toggle(SelectionTarget::All);
        let targets = selection.targets();
        assert!(targets.is_all_matching());
        assert!(!targets.is_empty());
        assert_eq!(targets.describe(), "all matching rows");
    }
}
