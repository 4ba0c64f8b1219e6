// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::actions::ActionDescriptor;
use crate::export::ExportDescriptor;
use crate::ids::*;

pub const DEFAULT_DEBOUNCE_MS: u64 = 350;
pub const DEFAULT_PER_PAGE: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Clause {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    NotStartsWith,
    NotEndsWith,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Before,
    After,
    OnOrBefore,
    OnOrAfter,
    Between,
    NotBetween,
    In,
    NotIn,
    IsSet,
    IsNotSet,
    IsTrue,
    IsFalse,
}

impl Clause {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::NotStartsWith => "not_starts_with",
            Self::NotEndsWith => "not_ends_with",
            Self::GreaterThan => "greater_than",
            Self::GreaterThanOrEqual => "greater_than_or_equal",
            Self::LessThan => "less_than",
            Self::LessThanOrEqual => "less_than_or_equal",
            Self::Before => "before",
            Self::After => "after",
            Self::OnOrBefore => "on_or_before",
            Self::OnOrAfter => "on_or_after",
            Self::Between => "between",
            Self::NotBetween => "not_between",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::IsSet => "is_set",
            Self::IsNotSet => "is_not_set",
            Self::IsTrue => "is_true",
            Self::IsFalse => "is_false",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "equals" => Some(Self::Equals),
            "not_equals" => Some(Self::NotEquals),
            "contains" => Some(Self::Contains),
            "not_contains" => Some(Self::NotContains),
            "starts_with" => Some(Self::StartsWith),
            "ends_with" => Some(Self::EndsWith),
            "not_starts_with" => Some(Self::NotStartsWith),
            "not_ends_with" => Some(Self::NotEndsWith),
            "greater_than" => Some(Self::GreaterThan),
            "greater_than_or_equal" => Some(Self::GreaterThanOrEqual),
            "less_than" => Some(Self::LessThan),
            "less_than_or_equal" => Some(Self::LessThanOrEqual),
            "before" => Some(Self::Before),
            "after" => Some(Self::After),
            "on_or_before" => Some(Self::OnOrBefore),
            "on_or_after" => Some(Self::OnOrAfter),
            "between" => Some(Self::Between),
            "not_between" => Some(Self::NotBetween),
            "in" => Some(Self::In),
            "not_in" => Some(Self::NotIn),
            "is_set" => Some(Self::IsSet),
            "is_not_set" => Some(Self::IsNotSet),
            "is_true" => Some(Self::IsTrue),
            "is_false" => Some(Self::IsFalse),
            _ => None,
        }
    }

    /// Clauses that compare against nothing; their filters never carry a value.
    pub const fn is_valueless(self) -> bool {
        matches!(
            self,
            Self::IsSet | Self::IsNotSet | Self::IsTrue | Self::IsFalse
        )
    }

    pub const fn expects_multiple(self) -> bool {
        matches!(
            self,
            Self::In | Self::NotIn | Self::Between | Self::NotBetween
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Text,
    Numeric,
    Set,
    Boolean,
    Date,
}

impl FilterType {
    pub const ALL: [Self; 5] = [
        Self::Text,
        Self::Numeric,
        Self::Set,
        Self::Boolean,
        Self::Date,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Numeric => "numeric",
            Self::Set => "set",
            Self::Boolean => "boolean",
            Self::Date => "date",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "numeric" => Some(Self::Numeric),
            "set" => Some(Self::Set),
            "boolean" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            _ => None,
        }
    }

    pub const fn clauses(self) -> &'static [Clause] {
        match self {
            Self::Text => &[
                Clause::Equals,
                Clause::NotEquals,
                Clause::Contains,
                Clause::NotContains,
                Clause::StartsWith,
                Clause::EndsWith,
                Clause::NotStartsWith,
                Clause::NotEndsWith,
                Clause::IsSet,
                Clause::IsNotSet,
            ],
            Self::Numeric => &[
                Clause::Equals,
                Clause::NotEquals,
                Clause::GreaterThan,
                Clause::GreaterThanOrEqual,
                Clause::LessThan,
                Clause::LessThanOrEqual,
                Clause::Between,
                Clause::NotBetween,
                Clause::IsSet,
                Clause::IsNotSet,
            ],
            Self::Set => &[
                Clause::In,
                Clause::NotIn,
                Clause::Equals,
                Clause::NotEquals,
                Clause::IsSet,
                Clause::IsNotSet,
            ],
            Self::Boolean => &[
                Clause::IsTrue,
                Clause::IsFalse,
                Clause::IsSet,
                Clause::IsNotSet,
            ],
            Self::Date => &[
                Clause::Equals,
                Clause::Before,
                Clause::After,
                Clause::OnOrBefore,
                Clause::OnOrAfter,
                Clause::Between,
                Clause::NotBetween,
                Clause::IsSet,
                Clause::IsNotSet,
            ],
        }
    }

    pub const fn default_clause(self) -> Clause {
        match self {
            Self::Text => Clause::Contains,
            Self::Numeric | Self::Date => Clause::Equals,
            Self::Set => Clause::In,
            Self::Boolean => Clause::IsTrue,
        }
    }

    pub fn supports(self, clause: Clause) -> bool {
        self.clauses().contains(&clause)
    }

    /// Empty value in the array shape a multi-value clause expects for this type.
    pub const fn empty_multi_value(self) -> FilterValue {
        match self {
            Self::Numeric | Self::Date => FilterValue::Range {
                min: None,
                max: None,
            },
            Self::Text | Self::Set | Self::Boolean => FilterValue::List(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FilterValue {
    #[default]
    Null,
    Text(String),
    List(Vec<String>),
    Range {
        min: Option<String>,
        max: Option<String>,
    },
}

impl FilterValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn range(min: Option<&str>, max: Option<&str>) -> Self {
        Self::Range {
            min: min.map(str::to_owned),
            max: max.map(str::to_owned),
        }
    }

    pub fn is_array_shaped(&self) -> bool {
        matches!(self, Self::List(_) | Self::Range { .. })
    }

    /// True when the value would filter nothing and must not be serialized.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(text) => text.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Range { min, max } => {
                min.as_deref().is_none_or(str::is_empty) && max.as_deref().is_none_or(str::is_empty)
            }
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(text) => text.clone(),
            Self::List(items) => items.join(", "),
            Self::Range { min, max } => format!(
                "{}..{}",
                min.as_deref().unwrap_or(""),
                max.as_deref().unwrap_or("")
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SortSpec {
    pub column: ColumnKey,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: ColumnKey::new(column),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: ColumnKey::new(column),
            direction: SortDirection::Desc,
        }
    }

    /// `name` sorts ascending, `-name` descending.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (direction, column) = match value.strip_prefix('-') {
            Some(rest) => (SortDirection::Desc, rest),
            None => (SortDirection::Asc, value),
        };
        if column.is_empty() {
            return None;
        }
        Some(Self {
            column: ColumnKey::new(column),
            direction,
        })
    }

    pub fn to_query(&self) -> String {
        match self.direction {
            SortDirection::Asc => self.column.as_str().to_owned(),
            SortDirection::Desc => format!("-{}", self.column),
        }
    }
}

impl TryFrom<String> for SortSpec {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid sort {value:?}"))
    }
}

impl From<SortSpec> for String {
    fn from(value: SortSpec) -> Self {
        value.to_query()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationType {
    #[default]
    Full,
    Simple,
    Cursor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollPolicy {
    #[default]
    Preserve,
    TopOfGrid,
    None,
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

fn default_per_page_options() -> Vec<u32> {
    vec![15, 30, 50, 100]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub key: ColumnKey,
    pub label: String,
    #[serde(default = "default_true")]
    pub toggleable: bool,
    #[serde(default = "default_true")]
    pub visible_by_default: bool,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default = "default_true")]
    pub stickable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    pub key: FilterKey,
    pub label: String,
    #[serde(rename = "type")]
    pub filter_type: FilterType,
    /// Narrows the type's clause list; empty means all of them.
    #[serde(default)]
    pub clauses: Vec<Clause>,
    #[serde(default)]
    pub options: Vec<FilterOption>,
}

impl FilterDescriptor {
    pub fn legal_clauses(&self) -> Vec<Clause> {
        if self.clauses.is_empty() {
            self.filter_type.clauses().to_vec()
        } else {
            self.clauses.clone()
        }
    }

    pub fn allows(&self, clause: Clause) -> bool {
        if self.clauses.is_empty() {
            self.filter_type.supports(clause)
        } else {
            self.clauses.contains(&clause)
        }
    }

    pub fn default_clause(&self) -> Clause {
        let preferred = self.filter_type.default_clause();
        if self.allows(preferred) {
            return preferred;
        }
        self.clauses.first().copied().unwrap_or(preferred)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDescriptor {
    #[serde(default)]
    pub name: GridName,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub filters: Vec<FilterDescriptor>,
    #[serde(default)]
    pub actions: Vec<ActionDescriptor>,
    #[serde(default)]
    pub exports: Vec<ExportDescriptor>,
    #[serde(default)]
    pub default_sort: Option<SortSpec>,
    #[serde(default = "default_per_page")]
    pub default_per_page: u32,
    #[serde(default = "default_per_page_options")]
    pub per_page_options: Vec<u32>,
    #[serde(default)]
    pub pagination_type: PaginationType,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub scroll_policy: ScrollPolicy,
    #[serde(default)]
    pub reload_props: Vec<String>,
    #[serde(default)]
    pub reload_everything: bool,
    #[serde(default = "default_true")]
    pub searchable: bool,
}

impl GridDescriptor {
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            bail!("grid {} declares no columns", self.name);
        }
        if self.default_per_page == 0 {
            bail!("grid {} default_per_page must be positive", self.name);
        }

        let mut seen = BTreeSet::new();
        for column in &self.columns {
            if !seen.insert(column.key.as_str()) {
                bail!("grid {} declares column {} twice", self.name, column.key);
            }
        }

        let mut seen = BTreeSet::new();
        for filter in &self.filters {
            if !seen.insert(filter.key.as_str()) {
                bail!("grid {} declares filter {} twice", self.name, filter.key);
            }
            if let Some(clause) = filter
                .clauses
                .iter()
                .find(|clause| !filter.filter_type.supports(**clause))
            {
                bail!(
                    "filter {} uses clause {} which {} filters do not support",
                    filter.key,
                    clause.as_str(),
                    filter.filter_type.as_str()
                );
            }
        }

        if let Some(sort) = &self.default_sort
            && !self
                .column(&sort.column)
                .is_some_and(|column| column.sortable)
        {
            bail!(
                "grid {} default sort {} is not a sortable column",
                self.name,
                sort.column
            );
        }

        Ok(())
    }

    pub fn column(&self, key: &ColumnKey) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|column| &column.key == key)
    }

    pub fn filter(&self, key: &FilterKey) -> Option<&FilterDescriptor> {
        self.filters.iter().find(|filter| &filter.key == key)
    }

    pub fn action(&self, key: &ActionKey) -> Option<&ActionDescriptor> {
        self.actions.iter().find(|action| &action.key == key)
    }

    pub fn export(&self, key: &ExportKey) -> Option<&ExportDescriptor> {
        self.exports.iter().find(|export| &export.key == key)
    }

    pub fn default_visible_columns(&self) -> BTreeSet<ColumnKey> {
        self.columns
            .iter()
            .filter(|column| column.toggleable && column.visible_by_default)
            .map(|column| column.key.clone())
            .collect()
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Keys for a partial reload; empty when the whole page must reload.
    pub fn partial_reload_keys(&self) -> Vec<String> {
        if self.reload_everything {
            return Vec::new();
        }
        let mut keys = vec![self.name.as_str().to_owned()];
        keys.extend(
            self.reload_props
                .iter()
                .filter(|prop| prop.as_str() != self.name.as_str())
                .cloned(),
        );
        keys
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PaginationMeta {
    #[serde(default)]
    pub current_page: Option<u32>,
    #[serde(default)]
    pub last_page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub previous_cursor: Option<String>,
    #[serde(default)]
    pub has_more_pages: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    #[serde(default)]
    pub cells: BTreeMap<ColumnKey, serde_json::Value>,
}

impl Row {
    pub fn cell_text(&self, column: &ColumnKey) -> String {
        match self.cells.get(column) {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(text)) => text.clone(),
            Some(serde_json::Value::Bool(true)) => "yes".to_owned(),
            Some(serde_json::Value::Bool(false)) => "no".to_owned(),
            Some(other) => other.to_string(),
        }
    }
}

/// The result of one round-trip: this grid's rows plus pagination metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GridSlice {
    /// Final location after server-side redirects, when the server reports it.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub pagination: PaginationMeta,
}

/// Why a request settled without a result. Cancellation is expected and never
/// surfaces to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Cancelled,
    Failed(String),
}

impl TransportError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => f.write_str("request cancelled"),
            Self::Failed(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for TransportError {}

/// What the server hands over at mount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPage {
    pub descriptor: GridDescriptor,
    pub url: String,
    #[serde(default)]
    pub slice: GridSlice,
}

#[cfg(test)]
mod tests {
    use super::{Clause, FilterType, FilterValue, GridDescriptor, SortDirection, SortSpec};

    fn descriptor_json() -> &'static str {
        r#"{
            "name": "users",
            "columns": [
                {"key": "name", "label": "Name", "toggleable": false, "sortable": true},
                {"key": "email", "label": "Email"}
            ],
            "filters": [
                {"key": "age", "label": "Age", "type": "numeric", "clauses": ["between", "equals"]}
            ],
            "actions": [
                {"key": "delete", "label": "Delete", "url": "/users/delete", "confirmation": {"title": "Sure?"}}
            ],
            "default_sort": "-name",
            "pagination_type": "cursor"
        }"#
    }

    #[test]
    fn clause_names_round_trip() {
        for filter_type in FilterType::ALL {
            for clause in filter_type.clauses() {
                assert_eq!(Clause::parse(clause.as_str()), Some(*clause));
            }
        }
        assert_eq!(Clause::parse("like"), None);
    }

    #[test]
    fn every_type_supports_its_default_clause() {
        for filter_type in FilterType::ALL {
            assert!(filter_type.supports(filter_type.default_clause()));
        }
    }

    #[test]
    fn valueless_and_multi_value_sets_are_disjoint() {
        for filter_type in FilterType::ALL {
            for clause in filter_type.clauses() {
                assert!(!(clause.is_valueless() && clause.expects_multiple()));
            }
        }
    }

    #[test]
    fn sort_spec_parses_descending_prefix() {
        let sort = SortSpec::parse("-created_at").expect("valid sort");
        assert_eq!(sort.column.as_str(), "created_at");
        assert_eq!(sort.direction, SortDirection::Desc);
        assert_eq!(sort.to_query(), "-created_at");
        assert_eq!(SortSpec::parse("-"), None);
        assert_eq!(SortSpec::parse(""), None);
    }

    #[test]
    fn empty_values_are_detected() {
        assert!(FilterValue::Null.is_empty());
        assert!(FilterValue::text("").is_empty());
        assert!(FilterValue::List(Vec::new()).is_empty());
        assert!(FilterValue::range(None, Some("")).is_empty());
        assert!(!FilterValue::range(Some("1"), None).is_empty());
        assert!(!FilterValue::text("a").is_empty());
    }

    #[test]
    fn descriptor_deserializes_with_defaults() -> anyhow::Result<()> {
        let descriptor: GridDescriptor = serde_json::from_str(descriptor_json())?;
        descriptor.validate()?;
        assert_eq!(descriptor.name.as_str(), "users");
        assert_eq!(descriptor.default_per_page, super::DEFAULT_PER_PAGE);
        assert_eq!(descriptor.debounce_ms, super::DEFAULT_DEBOUNCE_MS);
        assert_eq!(descriptor.default_sort, Some(SortSpec::desc("name")));
        assert_eq!(descriptor.pagination_type, super::PaginationType::Cursor);
        assert!(descriptor.columns[1].toggleable);
        assert!(descriptor.columns[1].visible_by_default);
        assert_eq!(
            descriptor.filters[0].default_clause(),
            Clause::Equals,
            "narrowed clause list keeps the type default when allowed"
        );
        assert_eq!(descriptor.partial_reload_keys(), vec!["users".to_owned()]);
        Ok(())
    }

    #[test]
    fn descriptor_rejects_clause_outside_type() -> anyhow::Result<()> {
        let mut descriptor: GridDescriptor = serde_json::from_str(descriptor_json())?;
        descriptor.filters[0].clauses = vec![Clause::Contains];
        let error = descriptor.validate().expect_err("contains is not numeric");
        assert!(error.to_string().contains("numeric filters do not support"));
        Ok(())
    }

    #[test]
    fn descriptor_rejects_unsortable_default_sort() -> anyhow::Result<()> {
        let mut descriptor: GridDescriptor = serde_json::from_str(descriptor_json())?;
        descriptor.default_sort = Some(SortSpec::asc("email"));
        let error = descriptor.validate().expect_err("email is not sortable");
        assert!(error.to_string().contains("not a sortable column"));
        Ok(())
    }
}
