//! The derived view engine.
//!
//! A derived view is what a table page renders: the raw collection filtered
//! by the descriptor, sorted, cut to the display limit, plus statistics over
//! the filtered set. Each stage is a pure function and is usable on its own;
//! [`derive`] composes them.
//!
//! Stages are generic over `R: Borrow<Record>` so the pipeline can run on
//! borrowed rows and only clone the records that survive.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value as Json;
use tracing::debug;

use crate::aggregate::{aggregate, Stats};
use crate::entity::Profile;
use crate::query::{DateRange, QueryDescriptor, SortDirection};
use crate::record::{Record, SortKey, Value};

/// Rows and statistics for one render.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DerivedView {
    pub rows: Vec<Record>,
    pub stats: Stats,
    /// Size of the raw collection.
    pub total: usize,
    /// Rows that passed the filter, before the display limit.
    pub matched: usize,
    /// Whether the display limit cut anything off.
    pub limited: bool,
}

// ------------- Filter -------------

/// Case-insensitive substring match against the searchable fields.
pub fn matches_search(record: &Record, term: &str, searchable: &[&str]) -> bool {
    if term.is_empty() {
        return true;
    }
    let term = term.to_lowercase();
    searchable
        .iter()
        .any(|field| record.text(field).is_some_and(|text| text.to_lowercase().contains(&term)))
}

/// Every active field filter must match exactly.
pub fn matches_filters(record: &Record, descriptor: &QueryDescriptor) -> bool {
    descriptor
        .active_filters()
        .all(|(field, expected)| record.get(field).is_some_and(|v| v.exact_eq(expected)))
}

/// Inclusive date-range check on the profile's timestamp field.
///
/// Entities without a timestamp field ignore the range. A missing or
/// unparsable timestamp fails any bounded range.
pub fn matches_range(record: &Record, range: &DateRange, timestamp_field: Option<&str>) -> bool {
    if range.is_open() {
        return true;
    }
    let Some(field) = timestamp_field else {
        return true;
    };
    match record.time(field) {
        Some(ts) => within(ts, range),
        None => false,
    }
}

fn within(ts: NaiveDateTime, range: &DateRange) -> bool {
    range.start.is_none_or(|start| ts >= start) && range.end.is_none_or(|end| ts <= end)
}

pub fn filter<R: Borrow<Record> + Clone>(records: &[R], descriptor: &QueryDescriptor, profile: &Profile) -> Vec<R> {
    if descriptor.is_unfiltered() {
        return records.to_vec();
    }
    records
        .iter()
        .filter(|r| {
            let record: &Record = (*r).borrow();
            matches_search(record, &descriptor.search_term, profile.searchable)
                && matches_filters(record, descriptor)
                && matches_range(record, &descriptor.date_range, profile.timestamp_field)
        })
        .cloned()
        .collect()
}

// ------------- Sort -------------

// Absent values sort last in either direction; the direction only flips
// the order of present ones, so ties stay in input order both ways.
fn order_keys(a: Option<&SortKey>, b: Option<&SortKey>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => match direction {
            SortDirection::Asc => x.cmp(y),
            SortDirection::Desc => x.cmp(y).reverse(),
        },
    }
}

/// Compares two records on `key`. Absent values sort last in either direction.
pub fn compare_on(a: &Record, b: &Record, key: &str, direction: SortDirection) -> Ordering {
    let x = a.get(key).map(Value::sort_key);
    let y = b.get(key).map(Value::sort_key);
    order_keys(x.as_ref(), y.as_ref(), direction)
}

pub fn sort<R: Borrow<Record>>(records: Vec<R>, key: Option<&str>, direction: SortDirection) -> Vec<R> {
    let Some(key) = key else {
        return records;
    };
    // keys are computed once per row, timestamps included
    let mut keyed: Vec<(Option<SortKey>, R)> = records
        .into_iter()
        .map(|r| {
            let record: &Record = r.borrow();
            (record.get(key).map(Value::sort_key), r)
        })
        .collect();
    // slice::sort_by is stable
    keyed.sort_by(|a, b| order_keys(a.0.as_ref(), b.0.as_ref(), direction));
    keyed.into_iter().map(|(_, r)| r).collect()
}

// ------------- Limit -------------

/// Keeps the first `n` records; no limit when `n` is absent, zero or negative.
pub fn limit<R>(mut records: Vec<R>, n: Option<i64>) -> Vec<R> {
    if let Some(n) = n.filter(|n| *n > 0) {
        records.truncate(usize::try_from(n).unwrap_or(usize::MAX));
    }
    records
}

// ------------- Pipeline -------------

/// filter → sort → limit, with statistics taken from the filtered set before the limit.
pub fn derive(records: &[Record], descriptor: &QueryDescriptor, profile: &Profile) -> DerivedView {
    let borrowed: Vec<&Record> = records.iter().collect();
    let filtered = filter(&borrowed, descriptor, profile);
    let stats = aggregate(&filtered, &profile.aggregates);
    let matched = filtered.len();
    let sorted = sort(filtered, descriptor.sort.key.as_deref(), descriptor.sort.direction);
    let rows: Vec<Record> = limit(sorted, descriptor.result_limit).into_iter().cloned().collect();
    debug!(total = records.len(), matched, rows = rows.len(), "view derived");
    DerivedView {
        limited: rows.len() < matched,
        rows,
        stats,
        total: records.len(),
        matched,
    }
}

/// Distinct values of `field` in first-seen order, as used by dropdowns.
pub fn facets(records: &[Record], field: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|r| r.get(field))
        .filter(|v| seen.insert(Json::from(*v).to_string()))
        .cloned()
        .collect()
}
