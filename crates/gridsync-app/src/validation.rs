// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use time::Date;
use time::macros::format_description;
use tracing::debug;

use crate::ids::FilterKey;
use crate::model::{Clause, FilterType, FilterValue, GridDescriptor};
use crate::state::TableState;

pub const DATE_LAYOUT: &str = "YYYY-MM-DD";

/// Coercion can cascade (a reset clause may itself be value-less), so the
/// pass repeats until nothing changes, up to this many times.
const MAX_PASSES: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coercion {
    ClauseReset {
        filter: FilterKey,
        from: Clause,
        to: Clause,
    },
    ValueCleared(FilterKey),
    ValueReshaped(FilterKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    InvalidNumber,
    InvalidDate,
    InvalidRange,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNumber => f.write_str("invalid number"),
            Self::InvalidDate => write!(f, "invalid date, expected {DATE_LAYOUT}"),
            Self::InvalidRange => f.write_str("invalid range, expected min..max"),
        }
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Brings every enabled filter in line with its clause. Returns what was
/// changed; an empty list means the state was already valid.
pub fn normalize(state: &mut TableState, descriptor: &GridDescriptor) -> Vec<Coercion> {
    let mut coercions = Vec::new();
    for _ in 0..MAX_PASSES {
        let pass = normalize_once(state, descriptor);
        if pass.is_empty() {
            break;
        }
        coercions.extend(pass);
    }
    for coercion in &coercions {
        debug!(?coercion, "coerced filter state");
    }
    coercions
}

fn normalize_once(state: &mut TableState, descriptor: &GridDescriptor) -> Vec<Coercion> {
    let mut coercions = Vec::new();
    for (key, filter) in state.filters.iter_mut().filter(|(_, filter)| filter.enabled) {
        let Some(filter_descriptor) = descriptor.filter(key) else {
            continue;
        };

        if !filter_descriptor.allows(filter.clause) {
            let to = filter_descriptor.default_clause();
            coercions.push(Coercion::ClauseReset {
                filter: key.clone(),
                from: filter.clause,
                to,
            });
            filter.clause = to;
        }

        if filter.clause.is_valueless() {
            if filter.value != FilterValue::Null {
                filter.value = FilterValue::Null;
                coercions.push(Coercion::ValueCleared(key.clone()));
            }
        } else if filter.clause.expects_multiple() && !filter.value.is_array_shaped() {
            filter.value = filter_descriptor.filter_type.empty_multi_value();
            coercions.push(Coercion::ValueReshaped(key.clone()));
        }
    }
    coercions
}

/// Turns what a user typed into a filter value for the given clause.
/// Multi-value clauses take `a, b, c` (lists) or `min..max` (ranges).
pub fn parse_filter_input(
    filter_type: FilterType,
    clause: Clause,
    input: &str,
) -> ValidationResult<FilterValue> {
    if clause.is_valueless() {
        return Ok(FilterValue::Null);
    }
    let input = input.trim();
    if input.is_empty() {
        return Ok(if clause.expects_multiple() {
            filter_type.empty_multi_value()
        } else {
            FilterValue::Null
        });
    }

    if !clause.expects_multiple() {
        check_scalar(filter_type, input)?;
        return Ok(FilterValue::text(input));
    }

    match filter_type {
        FilterType::Numeric | FilterType::Date => {
            let (min, max) = input.split_once("..").ok_or(ValidationError::InvalidRange)?;
            let min = min.trim();
            let max = max.trim();
            for bound in [min, max].into_iter().filter(|bound| !bound.is_empty()) {
                check_scalar(filter_type, bound)?;
            }
            Ok(FilterValue::range(
                (!min.is_empty()).then_some(min),
                (!max.is_empty()).then_some(max),
            ))
        }
        FilterType::Text | FilterType::Set | FilterType::Boolean => Ok(FilterValue::List(
            input
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_owned)
                .collect(),
        )),
    }
}

fn check_scalar(filter_type: FilterType, input: &str) -> ValidationResult<()> {
    match filter_type {
        FilterType::Numeric => parse_filter_number(input).map(|_| ()),
        FilterType::Date => parse_filter_date(input).map(|_| ()),
        FilterType::Text | FilterType::Set | FilterType::Boolean => Ok(()),
    }
}

pub fn parse_filter_number(input: &str) -> ValidationResult<f64> {
    let value = input
        .trim()
        .replace(',', "")
        .parse::<f64>()
        .map_err(|_| ValidationError::InvalidNumber)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::InvalidNumber)
    }
}

pub fn parse_filter_date(input: &str) -> ValidationResult<Date> {
    Date::parse(input.trim(), &format_description!("[year]-[month]-[day]"))
        .map_err(|_| ValidationError::InvalidDate)
}
