// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Canonical query form of a grid's [`TableState`].
//!
//! A fragment only carries what differs from the descriptor's defaults, so
//! two states that behave the same encode the same. Pairs use bracket
//! notation (`filters[age][clause]=between`) and are nested under the grid
//! name (`users[search]=ann`) unless the grid is called `default`.

use std::collections::BTreeMap;

use url::Url;
use url::form_urlencoded;

use crate::ids::{ColumnKey, FilterKey, GridName};
use crate::model::{Clause, FilterValue, GridDescriptor, PaginationType, SortSpec};
use crate::state::{FilterState, PagePosition, TableState};
use crate::validation::normalize;

const TOP_LEVEL_KEYS: [&str; 8] = [
    "search", "sort", "perPage", "page", "cursor", "columns", "sticky", "filters",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterFragment {
    /// Absent when the pairs named the filter without a clause.
    pub clause: Option<Clause>,
    pub value: FilterValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryFragment {
    pub search: Option<String>,
    pub sort: Option<SortSpec>,
    pub per_page: Option<u32>,
    pub page: Option<u32>,
    pub cursor: Option<String>,
    /// `Some(vec![])` hides every toggleable column.
    pub columns: Option<Vec<ColumnKey>>,
    pub sticky: Vec<ColumnKey>,
    pub filters: BTreeMap<FilterKey, FilterFragment>,
}

pub fn encode(state: &TableState, descriptor: &GridDescriptor) -> QueryFragment {
    let visible = state.visible_toggleable();
    let columns = (visible != descriptor.default_visible_columns()).then(|| {
        descriptor
            .columns
            .iter()
            .filter(|column| visible.contains(&column.key))
            .map(|column| column.key.clone())
            .collect()
    });

    let filters = state
        .active_filters()
        .filter_map(|(key, filter)| {
            if filter.clause.is_valueless() {
                return Some((
                    key.clone(),
                    FilterFragment {
                        clause: Some(filter.clause),
                        value: FilterValue::Null,
                    },
                ));
            }
            if filter.value.is_empty() {
                return None;
            }
            Some((
                key.clone(),
                FilterFragment {
                    clause: Some(filter.clause),
                    value: filter.value.clone(),
                },
            ))
        })
        .collect();

    let (page, cursor) = match &state.position {
        PagePosition::Page(page) => ((*page >= 2).then_some(*page), None),
        PagePosition::Cursor(cursor) => (None, cursor.clone().filter(|cursor| !cursor.is_empty())),
    };

    QueryFragment {
        search: state.search.clone().filter(|search| !search.is_empty()),
        sort: state
            .sort
            .clone()
            .filter(|sort| descriptor.default_sort.as_ref() != Some(sort)),
        per_page: (state.per_page != descriptor.default_per_page).then_some(state.per_page),
        page,
        cursor,
        columns,
        sticky: state.sticky.clone(),
        filters,
    }
}

/// Builds a valid [`TableState`] from whatever the fragment holds. Unknown
/// columns, filters and clauses are dropped.
pub fn decode(fragment: &QueryFragment, descriptor: &GridDescriptor) -> TableState {
    let mut state = TableState::initial(descriptor);

    state.search = fragment.search.clone().filter(|search| !search.trim().is_empty());
    state.sort = fragment.sort.clone().filter(|sort| {
        descriptor
            .column(&sort.column)
            .is_some_and(|column| column.sortable)
    });
    if let Some(per_page) = fragment.per_page.filter(|per_page| *per_page > 0) {
        state.per_page = per_page;
    }
    state.position = match descriptor.pagination_type {
        PaginationType::Full | PaginationType::Simple => {
            PagePosition::Page(fragment.page.unwrap_or(1).max(1))
        }
        PaginationType::Cursor => {
            PagePosition::Cursor(fragment.cursor.clone().filter(|cursor| !cursor.is_empty()))
        }
    };

    if let Some(columns) = &fragment.columns {
        for (key, visible) in &mut state.columns {
            *visible = columns.contains(key);
        }
    }

    // Sticky columns are always a prefix of the visible columns ending at a
    // stickable one; keep the longest such prefix the fragment agrees with.
    let visible = state.visible_columns(descriptor);
    let matched = fragment
        .sticky
        .iter()
        .zip(&visible)
        .take_while(|(requested, shown)| requested == shown)
        .count();
    if let Some(end) = (1..=matched).rev().find(|end| {
        descriptor
            .column(&visible[end - 1])
            .is_some_and(|column| column.stickable)
    }) {
        state.sticky = visible[..end].to_vec();
    }

    for (key, filter) in &fragment.filters {
        let Some(filter_descriptor) = descriptor.filter(key) else {
            continue;
        };
        let clause = filter
            .clause
            .filter(|clause| filter_descriptor.allows(*clause))
            .unwrap_or_else(|| filter_descriptor.default_clause());
        state.filters.insert(
            key.clone(),
            FilterState {
                enabled: true,
                clause,
                value: filter.value.clone(),
                is_new: false,
            },
        );
    }
    normalize(&mut state, descriptor);

    state
}

impl QueryFragment {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The part of the query the server sees; sticky columns are a purely
    /// client-side concern.
    pub fn without_sticky(&self) -> Self {
        Self {
            sticky: Vec::new(),
            ..self.clone()
        }
    }

    pub fn same_server_query(&self, other: &Self) -> bool {
        self.without_sticky() == other.without_sticky()
    }

    /// True when both select the same rows: only column visibility or
    /// sticky columns differ.
    pub fn same_rows(&self, other: &Self) -> bool {
        let rows = |fragment: &Self| Self {
            columns: None,
            ..fragment.without_sticky()
        };
        rows(self) == rows(other)
    }

    pub fn to_pairs(&self, grid: &GridName) -> Vec<(String, String)> {
        let key = |path: &[&str]| bracket_key(grid, path);
        let mut pairs = Vec::new();

        if let Some(search) = &self.search {
            pairs.push((key(&["search"]), search.clone()));
        }
        if let Some(sort) = &self.sort {
            pairs.push((key(&["sort"]), sort.to_query()));
        }
        if let Some(per_page) = self.per_page {
            pairs.push((key(&["perPage"]), per_page.to_string()));
        }
        if let Some(page) = self.page {
            pairs.push((key(&["page"]), page.to_string()));
        }
        if let Some(cursor) = &self.cursor {
            pairs.push((key(&["cursor"]), cursor.clone()));
        }
        match &self.columns {
            Some(columns) if columns.is_empty() => pairs.push((key(&["columns"]), String::new())),
            Some(columns) => {
                for (index, column) in columns.iter().enumerate() {
                    pairs.push((key(&["columns", &index.to_string()]), column.to_string()));
                }
            }
            None => {}
        }
        for (index, column) in self.sticky.iter().enumerate() {
            pairs.push((key(&["sticky", &index.to_string()]), column.to_string()));
        }
        for (filter, fragment) in &self.filters {
            let name = filter.as_str();
            if let Some(clause) = fragment.clause {
                pairs.push((key(&["filters", name, "clause"]), clause.as_str().to_owned()));
            }
            match &fragment.value {
                FilterValue::Null => {}
                FilterValue::Text(text) => {
                    pairs.push((key(&["filters", name, "value"]), text.clone()));
                }
                FilterValue::List(items) => {
                    for (index, item) in items.iter().enumerate() {
                        pairs.push((
                            key(&["filters", name, "value", &index.to_string()]),
                            item.clone(),
                        ));
                    }
                }
                FilterValue::Range { min, max } => {
                    for (bound, value) in [("min", min), ("max", max)] {
                        if let Some(value) = value.as_deref().filter(|value| !value.is_empty()) {
                            pairs.push((key(&["filters", name, "value", bound]), value.to_owned()));
                        }
                    }
                }
            }
        }
        pairs
    }

    /// Reads this grid's pairs and ignores everything else.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>, grid: &GridName) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut fragment = Self::default();
        let mut columns: BTreeMap<usize, ColumnKey> = BTreeMap::new();
        let mut explicit_empty_columns = false;
        let mut sticky: BTreeMap<usize, ColumnKey> = BTreeMap::new();
        let mut list_values: BTreeMap<FilterKey, BTreeMap<usize, String>> = BTreeMap::new();

        for (raw_key, value) in pairs {
            let Some(path) = grid_path(raw_key.as_ref(), grid) else {
                continue;
            };
            let value = value.as_ref();
            let segments: Vec<&str> = path.iter().map(String::as_str).collect();
            match segments.as_slice() {
                ["search"] => fragment.search = Some(value.to_owned()).filter(|v| !v.is_empty()),
                ["sort"] => fragment.sort = SortSpec::parse(value),
                ["perPage"] => fragment.per_page = value.parse().ok(),
                ["page"] => fragment.page = value.parse().ok(),
                ["cursor"] => fragment.cursor = Some(value.to_owned()).filter(|v| !v.is_empty()),
                ["columns"] => explicit_empty_columns = true,
                ["columns", index] => {
                    if let Some(index) = list_index(index, columns.len()) {
                        columns.insert(index, ColumnKey::new(value));
                    }
                }
                ["sticky", index] => {
                    if let Some(index) = list_index(index, sticky.len()) {
                        sticky.insert(index, ColumnKey::new(value));
                    }
                }
                ["filters", name, "clause"] => {
                    filter_entry(&mut fragment, name).clause = Clause::parse(value);
                }
                ["filters", name, "value"] => {
                    filter_entry(&mut fragment, name).value = FilterValue::text(value);
                }
                ["filters", name, "value", bound @ ("min" | "max")] => {
                    let entry = filter_entry(&mut fragment, name);
                    let (mut min, mut max) = match std::mem::take(&mut entry.value) {
                        FilterValue::Range { min, max } => (min, max),
                        _ => (None, None),
                    };
                    if *bound == "min" {
                        min = Some(value.to_owned());
                    } else {
                        max = Some(value.to_owned());
                    }
                    entry.value = FilterValue::Range { min, max };
                }
                ["filters", name, "value", index] => {
                    let items = list_values.entry(FilterKey::new(*name)).or_default();
                    if let Some(index) = list_index(index, items.len()) {
                        filter_entry(&mut fragment, name);
                        items.insert(index, value.to_owned());
                    }
                }
                _ => {}
            }
        }

        for (key, items) in list_values {
            if let Some(entry) = fragment.filters.get_mut(&key) {
                entry.value = FilterValue::List(items.into_values().collect());
            }
        }
        if !columns.is_empty() {
            fragment.columns = Some(columns.into_values().collect());
        } else if explicit_empty_columns {
            fragment.columns = Some(Vec::new());
        }
        fragment.sticky = sticky.into_values().collect();
        fragment
    }

    pub fn from_url(url: &Url, grid: &GridName) -> Self {
        Self::from_pairs(url.query_pairs(), grid)
    }

    /// Form-encoded pairs, as sent with "all matching rows" mutations.
    pub fn to_query_string(&self, grid: &GridName) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.to_pairs(grid))
            .finish()
    }
}

/// Replaces this grid's parameters on `location` and keeps all others in
/// their original order.
pub fn merge_into_url(location: &Url, fragment: &QueryFragment, grid: &GridName) -> Url {
    let kept: Vec<(String, String)> = location
        .query_pairs()
        .filter(|(key, _)| !belongs_to_grid(key, grid))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    let ours = fragment.to_pairs(grid);

    let mut url = location.clone();
    if kept.is_empty() && ours.is_empty() {
        url.set_query(None);
        return url;
    }
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .extend_pairs(ours);
    url
}

fn filter_entry<'a>(fragment: &'a mut QueryFragment, name: &str) -> &'a mut FilterFragment {
    fragment
        .filters
        .entry(FilterKey::new(name))
        .or_insert(FilterFragment {
            clause: None,
            value: FilterValue::Null,
        })
}

/// `columns[]` appends; `columns[3]` places at 3.
fn list_index(segment: &str, len: usize) -> Option<usize> {
    if segment.is_empty() {
        return Some(len);
    }
    segment.parse().ok()
}

fn bracket_key(grid: &GridName, path: &[&str]) -> String {
    let mut segments = path.iter();
    let mut key = if grid.is_default() {
        segments.next().map(|first| (*first).to_owned()).unwrap_or_default()
    } else {
        grid.as_str().to_owned()
    };
    for segment in segments {
        key.push('[');
        key.push_str(segment);
        key.push(']');
    }
    key
}

/// `a[b][c]` becomes `["a", "b", "c"]`; `None` when the brackets do not
/// balance.
fn split_key(key: &str) -> Option<Vec<String>> {
    let (head, mut rest) = match key.find('[') {
        Some(index) => (&key[..index], &key[index..]),
        None => (key, ""),
    };
    if head.is_empty() {
        return None;
    }
    let mut segments = vec![head.to_owned()];
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let close = inner.find(']')?;
        segments.push(inner[..close].to_owned());
        rest = &inner[close + 1..];
    }
    Some(segments)
}

fn grid_path(key: &str, grid: &GridName) -> Option<Vec<String>> {
    let mut segments = split_key(key)?;
    if grid.is_default() {
        return Some(segments);
    }
    if segments.len() < 2 || segments[0] != grid.as_str() {
        return None;
    }
    segments.remove(0);
    Some(segments)
}

fn belongs_to_grid(key: &str, grid: &GridName) -> bool {
    match grid_path(key, grid) {
        Some(path) if grid.is_default() => TOP_LEVEL_KEYS.contains(&path[0].as_str()),
        Some(_) => true,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{QueryFragment, decode, encode, merge_into_url, split_key};
    use crate::ids::{ColumnKey, FilterKey, GridName};
    use crate::model::{Clause, FilterValue, GridDescriptor, SortSpec};
    use crate::state::{GridCommand, PagePosition, TableState};
    use url::Url;

    fn descriptor() -> GridDescriptor {
        serde_json::from_value(serde_json::json!({
            "name": "users",
            "columns": [
                {"key": "name", "label": "Name", "toggleable": false, "sortable": true},
                {"key": "email", "label": "Email", "sortable": true},
                {"key": "role", "label": "Role"},
                {"key": "notes", "label": "Notes", "visible_by_default": false}
            ],
            "filters": [
                {"key": "age", "label": "Age", "type": "numeric"},
                {"key": "role", "label": "Role", "type": "set"},
                {"key": "active", "label": "Active", "type": "boolean"},
                {"key": "email", "label": "Email", "type": "text"}
            ],
            "default_sort": "name"
        }))
        .expect("descriptor")
    }

    fn grid() -> GridName {
        GridName::new("users")
    }

    fn busy_state(descriptor: &GridDescriptor) -> TableState {
        let mut state = TableState::initial(descriptor);
        for command in [
            GridCommand::SetSearch("ann".to_owned()),
            GridCommand::SetSort(Some(SortSpec::desc("email"))),
            GridCommand::SetPerPage(50),
            GridCommand::GoToPage(3),
            GridCommand::ToggleColumn(ColumnKey::new("notes")),
            GridCommand::MakeSticky(ColumnKey::new("email")),
            GridCommand::SetFilter {
                key: FilterKey::new("age"),
                clause: Clause::Between,
                value: FilterValue::range(Some("18"), Some("65")),
            },
            GridCommand::SetFilter {
                key: FilterKey::new("role"),
                clause: Clause::In,
                value: FilterValue::List(vec!["admin".to_owned(), "editor".to_owned()]),
            },
            GridCommand::SetFilter {
                key: FilterKey::new("active"),
                clause: Clause::IsTrue,
                value: FilterValue::Null,
            },
        ] {
            state.apply(&command, descriptor);
        }
        state
    }

    #[test]
    fn default_state_encodes_to_nothing() {
        let descriptor = descriptor();
        let state = TableState::initial(&descriptor);
        let fragment = encode(&state, &descriptor);
        assert!(fragment.is_empty());
        assert!(fragment.to_pairs(&grid()).is_empty());
    }

    #[test]
    fn encode_decode_reaches_a_fixed_point() {
        let descriptor = descriptor();
        let state = busy_state(&descriptor);
        let first = encode(&state, &descriptor);

        let pairs = first.to_pairs(&grid());
        let parsed = QueryFragment::from_pairs(pairs, &grid());
        assert_eq!(parsed, first);

        let decoded = decode(&parsed, &descriptor);
        assert_eq!(encode(&decoded, &descriptor), first);
        assert_eq!(decoded.position, PagePosition::Page(3));
    }

    #[test]
    fn valueless_clauses_never_emit_value() {
        let descriptor = descriptor();
        let mut state = TableState::initial(&descriptor);
        let filter = state
            .filters
            .get_mut(&FilterKey::new("age"))
            .expect("declared");
        filter.enabled = true;
        filter.clause = Clause::IsNotSet;
        filter.value = FilterValue::text("42");

        let pairs = encode(&state, &descriptor).to_pairs(&grid());
        assert!(pairs.iter().any(|(key, value)| {
            key == "users[filters][age][clause]" && value == "is_not_set"
        }));
        assert!(!pairs.iter().any(|(key, _)| key.contains("[value]")));
    }

    #[test]
    fn empty_values_and_defaults_are_omitted() {
        let descriptor = descriptor();
        let mut state = TableState::initial(&descriptor);
        state.apply(&GridCommand::AddFilter(FilterKey::new("email")), &descriptor);
        state.apply(&GridCommand::SetSort(Some(SortSpec::asc("name"))), &descriptor);
        state.apply(&GridCommand::GoToPage(1), &descriptor);
        assert!(encode(&state, &descriptor).is_empty());
    }

    #[test]
    fn explicitly_empty_columns_survive_round_trip() {
        let descriptor = descriptor();
        let mut state = TableState::initial(&descriptor);
        state.apply(&GridCommand::ToggleColumn(ColumnKey::new("email")), &descriptor);
        state.apply(&GridCommand::ToggleColumn(ColumnKey::new("role")), &descriptor);

        let pairs = encode(&state, &descriptor).to_pairs(&grid());
        assert_eq!(pairs, vec![("users[columns]".to_owned(), String::new())]);

        let decoded = decode(&QueryFragment::from_pairs(pairs, &grid()), &descriptor);
        assert!(decoded.visible_toggleable().is_empty());
        assert!(decoded.is_visible(&descriptor, &ColumnKey::new("name")));
    }

    #[test]
    fn default_grid_is_not_nested() {
        let descriptor = descriptor();
        let mut state = TableState::initial(&descriptor);
        state.apply(&GridCommand::SetSearch("ann".to_owned()), &descriptor);
        let pairs = encode(&state, &descriptor).to_pairs(&GridName::default());
        assert_eq!(pairs, vec![("search".to_owned(), "ann".to_owned())]);
    }

    #[test]
    fn decode_drops_unknown_and_illegal_entries() {
        let descriptor = descriptor();
        let pairs = [
            ("users[sort]", "role"),
            ("users[filters][ghost][clause]", "equals"),
            ("users[filters][role][clause]", "between"),
            ("users[filters][role][value][0]", "admin"),
            ("users[columns][0]", "ghost"),
            ("users[sticky][0]", "notes"),
            ("users[page]", "0"),
            ("orders[search]", "other grid"),
        ];
        let state = decode(&QueryFragment::from_pairs(pairs, &grid()), &descriptor);

        assert_eq!(state.sort, None, "role is not sortable");
        assert!(!state.filters.contains_key(&FilterKey::new("ghost")));
        let role = &state.filters[&FilterKey::new("role")];
        assert_eq!(role.clause, Clause::In);
        assert_eq!(role.value, FilterValue::List(vec!["admin".to_owned()]));
        assert!(state.visible_toggleable().is_empty());
        assert!(state.sticky.is_empty(), "notes is hidden");
        assert_eq!(state.position, PagePosition::Page(1));
        assert_eq!(state.search, None);
    }

    #[test]
    fn merge_keeps_unrelated_parameters() -> anyhow::Result<()> {
        let descriptor = descriptor();
        let location = Url::parse(
            "https://example.test/admin?tab=2&users%5Bsearch%5D=old&orders%5Bpage%5D=4",
        )?;
        let mut state = TableState::initial(&descriptor);
        state.apply(&GridCommand::GoToPage(2), &descriptor);

        let merged = merge_into_url(&location, &encode(&state, &descriptor), &grid());
        let pairs: Vec<(String, String)> = merged
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("tab".to_owned(), "2".to_owned()),
                ("orders[page]".to_owned(), "4".to_owned()),
                ("users[page]".to_owned(), "2".to_owned()),
            ]
        );
        Ok(())
    }

    #[test]
    fn merge_of_empty_default_fragment_clears_query() -> anyhow::Result<()> {
        let location = Url::parse("https://example.test/admin?search=ann&page=2")?;
        let merged = merge_into_url(&location, &QueryFragment::default(), &GridName::default());
        assert_eq!(merged.as_str(), "https://example.test/admin");
        Ok(())
    }

    #[test]
    fn decode_keeps_only_a_visible_prefix_of_sticky_columns() {
        let descriptor = descriptor();
        let decode_sticky = |columns: &[&str]| {
            let pairs: Vec<(String, String)> = columns
                .iter()
                .enumerate()
                .map(|(index, column)| (format!("users[sticky][{index}]"), (*column).to_owned()))
                .collect();
            decode(&QueryFragment::from_pairs(pairs, &grid()), &descriptor).sticky
        };

        assert_eq!(
            decode_sticky(&["name", "email"]),
            vec![ColumnKey::new("name"), ColumnKey::new("email")]
        );
        assert!(decode_sticky(&["role"]).is_empty(), "role is not leading");
        assert!(decode_sticky(&["email", "name"]).is_empty());
        assert_eq!(
            decode_sticky(&["name", "role"]),
            vec![ColumnKey::new("name")],
            "run stops where declared order diverges"
        );
    }

    #[test]
    fn sticky_differences_do_not_change_the_server_query() {
        let descriptor = descriptor();
        let base = TableState::initial(&descriptor);
        let mut pinned = base.clone();
        pinned.apply(&GridCommand::MakeSticky(ColumnKey::new("email")), &descriptor);

        let base = encode(&base, &descriptor);
        let pinned = encode(&pinned, &descriptor);
        assert_ne!(base, pinned);
        assert!(base.same_server_query(&pinned));
    }

    #[test]
    fn split_key_handles_brackets() {
        assert_eq!(
            split_key("users[filters][age][value][min]"),
            Some(vec![
                "users".to_owned(),
                "filters".to_owned(),
                "age".to_owned(),
                "value".to_owned(),
                "min".to_owned()
            ])
        );
        assert_eq!(split_key("columns[]"), Some(vec!["columns".to_owned(), String::new()]));
        assert_eq!(split_key("broken[x"), None);
        assert_eq!(split_key("[x]"), None);
    }
}
