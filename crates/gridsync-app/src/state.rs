// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::{BTreeMap, BTreeSet};

use crate::ids::{ColumnKey, FilterKey};
use crate::model::{Clause, FilterValue, GridDescriptor, PaginationType, SortSpec};
use crate::sticky::{sticky_before, sticky_through};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    pub enabled: bool,
    pub clause: Clause,
    pub value: FilterValue,
    /// Added through the filter picker and not yet given a value.
    pub is_new: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagePosition {
    Page(u32),
    Cursor(Option<String>),
}

impl PagePosition {
    pub fn first(pagination: PaginationType) -> Self {
        match pagination {
            PaginationType::Full | PaginationType::Simple => Self::Page(1),
            PaginationType::Cursor => Self::Cursor(None),
        }
    }

    pub fn page(&self) -> Option<u32> {
        match self {
            Self::Page(page) => Some(*page),
            Self::Cursor(_) => None,
        }
    }

    pub fn cursor(&self) -> Option<&str> {
        match self {
            Self::Page(_) => None,
            Self::Cursor(cursor) => cursor.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableState {
    /// Visibility of toggleable columns. Other columns are always shown.
    pub columns: BTreeMap<ColumnKey, bool>,
    pub filters: BTreeMap<FilterKey, FilterState>,
    pub search: Option<String>,
    pub sort: Option<SortSpec>,
    pub per_page: u32,
    pub position: PagePosition,
    pub sticky: Vec<ColumnKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridCommand {
    SetFilter {
        key: FilterKey,
        clause: Clause,
        value: FilterValue,
    },
    AddFilter(FilterKey),
    RemoveFilter(FilterKey),
    SetSort(Option<SortSpec>),
    SetSearch(String),
    SetPerPage(u32),
    ToggleColumn(ColumnKey),
    MakeSticky(ColumnKey),
    UndoSticky(ColumnKey),
    GoToPage(u32),
    SetCursor(Option<String>),
}

impl GridCommand {
    pub const fn kind(&self) -> ChangeKind {
        match self {
            Self::MakeSticky(_) | Self::UndoSticky(_) => ChangeKind::ClientOnly,
            Self::SetFilter { .. } | Self::AddFilter(_) | Self::SetSearch(_) => {
                ChangeKind::Debounced
            }
            Self::RemoveFilter(_)
            | Self::SetSort(_)
            | Self::SetPerPage(_)
            | Self::ToggleColumn(_)
            | Self::GoToPage(_)
            | Self::SetCursor(_) => ChangeKind::Immediate,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SetFilter { .. } => "set_filter",
            Self::AddFilter(_) => "add_filter",
            Self::RemoveFilter(_) => "remove_filter",
            Self::SetSort(_) => "set_sort",
            Self::SetSearch(_) => "set_search",
            Self::SetPerPage(_) => "set_per_page",
            Self::ToggleColumn(_) => "toggle_column",
            Self::MakeSticky(_) => "make_sticky",
            Self::UndoSticky(_) => "undo_sticky",
            Self::GoToPage(_) => "go_to_page",
            Self::SetCursor(_) => "set_cursor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    ClientOnly,
    Immediate,
    Debounced,
}

impl TableState {
    pub fn initial(descriptor: &GridDescriptor) -> Self {
        let visible = descriptor.default_visible_columns();
        Self {
            columns: descriptor
                .columns
                .iter()
                .filter(|column| column.toggleable)
                .map(|column| (column.key.clone(), visible.contains(&column.key)))
                .collect(),
            filters: descriptor
                .filters
                .iter()
                .map(|filter| {
                    (
                        filter.key.clone(),
                        FilterState {
                            enabled: false,
                            clause: filter.default_clause(),
                            value: FilterValue::Null,
                            is_new: false,
                        },
                    )
                })
                .collect(),
            search: None,
            sort: None,
            per_page: descriptor.default_per_page,
            position: PagePosition::first(descriptor.pagination_type),
            sticky: Vec::new(),
        }
    }

    pub fn is_visible(&self, descriptor: &GridDescriptor, key: &ColumnKey) -> bool {
        match descriptor.column(key) {
            Some(column) if column.toggleable => self.columns.get(key).copied().unwrap_or(false),
            Some(_) => true,
            None => false,
        }
    }

    /// Visible columns in display order: the sticky run, then the rest in
    /// declaration order.
    pub fn visible_columns(&self, descriptor: &GridDescriptor) -> Vec<ColumnKey> {
        let mut ordered = self.sticky.clone();
        ordered.extend(
            descriptor
                .columns
                .iter()
                .filter(|column| self.is_visible(descriptor, &column.key))
                .filter(|column| !self.sticky.contains(&column.key))
                .map(|column| column.key.clone()),
        );
        ordered
    }

    pub fn visible_toggleable(&self) -> BTreeSet<ColumnKey> {
        self.columns
            .iter()
            .filter(|(_, visible)| **visible)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// The sort in force, falling back to the declared default.
    pub fn effective_sort<'a>(&'a self, descriptor: &'a GridDescriptor) -> Option<&'a SortSpec> {
        self.sort.as_ref().or(descriptor.default_sort.as_ref())
    }

    pub fn active_filters(&self) -> impl Iterator<Item = (&FilterKey, &FilterState)> {
        self.filters.iter().filter(|(_, filter)| filter.enabled)
    }

    /// Applies a command in place. `None` means nothing changed.
    pub fn apply(&mut self, command: &GridCommand, descriptor: &GridDescriptor) -> Option<ChangeKind> {
        let before = self.clone();
        match command {
            GridCommand::SetFilter { key, clause, value } => {
                let filter_descriptor = descriptor.filter(key)?;
                let filter = self.filters.get_mut(key)?;
                filter.enabled = true;
                filter.clause = if filter_descriptor.allows(*clause) {
                    *clause
                } else {
                    filter_descriptor.default_clause()
                };
                filter.value = value.clone();
                filter.is_new = false;
            }
            GridCommand::AddFilter(key) => {
                let filter_descriptor = descriptor.filter(key)?;
                let filter = self.filters.get_mut(key)?;
                if filter.enabled {
                    return None;
                }
                filter.enabled = true;
                filter.clause = filter_descriptor.default_clause();
                filter.value = FilterValue::Null;
                filter.is_new = true;
            }
            GridCommand::RemoveFilter(key) => {
                let filter = self.filters.get_mut(key)?;
                filter.enabled = false;
                filter.value = FilterValue::Null;
                filter.is_new = false;
            }
            GridCommand::SetSort(sort) => {
                if let Some(sort) = sort
                    && !descriptor
                        .column(&sort.column)
                        .is_some_and(|column| column.sortable)
                {
                    return None;
                }
                self.sort = sort.clone();
            }
            GridCommand::SetSearch(search) => {
                if !descriptor.searchable {
                    return None;
                }
                let search = search.trim();
                self.search = (!search.is_empty()).then(|| search.to_owned());
            }
            GridCommand::SetPerPage(per_page) => {
                if *per_page == 0 || *per_page == self.per_page {
                    return None;
                }
                self.per_page = *per_page;
                if descriptor.pagination_type == PaginationType::Simple {
                    self.position = PagePosition::Page(1);
                }
            }
            GridCommand::ToggleColumn(key) => {
                let visible = self.columns.get_mut(key)?;
                *visible = !*visible;
                if !*visible && self.sticky.contains(key) {
                    self.sticky = sticky_before(&self.sticky, key);
                }
            }
            GridCommand::MakeSticky(key) => {
                if !descriptor
                    .column(key)
                    .is_some_and(|column| column.stickable)
                {
                    return None;
                }
                let visible = self.visible_columns(descriptor);
                self.sticky = sticky_through(&visible, key)?;
            }
            GridCommand::UndoSticky(key) => {
                self.sticky = sticky_before(&self.sticky, key);
            }
            GridCommand::GoToPage(page) => match &mut self.position {
                PagePosition::Page(current) => *current = (*page).max(1),
                PagePosition::Cursor(_) => return None,
            },
            GridCommand::SetCursor(cursor) => match &mut self.position {
                PagePosition::Cursor(current) => {
                    *current = cursor.clone().filter(|cursor| !cursor.is_empty());
                }
                PagePosition::Page(_) => return None,
            },
        }

        if *self == before {
            return None;
        }

        let kind = command.kind();
        let moves_position = matches!(command, GridCommand::GoToPage(_) | GridCommand::SetCursor(_));
        if kind != ChangeKind::ClientOnly
            && !moves_position
            && matches!(self.position, PagePosition::Cursor(Some(_)))
        {
            self.position = PagePosition::Cursor(None);
        }
        Some(kind)
    }
}
