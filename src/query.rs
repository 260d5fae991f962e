//! The query descriptor: everything a page asks of the engine.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::record::{parse_time, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

/// Which column a table is sorted by, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortState {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortState {
    pub fn by(key: &str, direction: SortDirection) -> Self {
        Self { key: Some(key.to_owned()), direction }
    }
    /// Header click: the same key flips the direction, a new key starts ascending.
    pub fn toggle(&self, key: &str) -> Self {
        let direction = match (&self.key, self.direction) {
            (Some(current), SortDirection::Asc) if current == key => SortDirection::Desc,
            _ => SortDirection::Asc,
        };
        Self { key: Some(key.to_owned()), direction }
    }
}

/// Inclusive bounds applied to an entity's timestamp field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, deserialize_with = "lenient_time")]
    pub start: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "lenient_time")]
    pub end: Option<NaiveDateTime>,
}

impl DateRange {
    pub fn is_open(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

// An empty date input means "no bound"; anything unparsable is treated the same.
fn lenient_time<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_time))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    #[serde(default, alias = "searchTerm")]
    pub search_term: String,
    #[serde(default, alias = "fieldFilters")]
    pub field_filters: BTreeMap<String, Value>,
    #[serde(default)]
    pub sort: SortState,
    #[serde(default, alias = "dateRange")]
    pub date_range: DateRange,
    #[serde(default, alias = "resultLimit")]
    pub result_limit: Option<i64>,
}

impl QueryDescriptor {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn search(mut self, term: &str) -> Self {
        self.search_term = term.to_owned();
        self
    }
    pub fn filter(mut self, field: &str, expected: impl Into<Value>) -> Self {
        self.field_filters.insert(field.to_owned(), expected.into());
        self
    }
    pub fn sort_by(mut self, key: &str, direction: SortDirection) -> Self {
        self.sort = SortState::by(key, direction);
        self
    }
    pub fn between(mut self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        self.date_range = DateRange { start, end };
        self
    }
    pub fn limit(mut self, n: i64) -> Self {
        self.result_limit = Some(n);
        self
    }
    /// Filters that actually constrain the result.
    pub fn active_filters(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.field_filters.iter().filter(|(_, v)| !v.is_blank())
    }
    /// True when filtering is the identity transform.
    pub fn is_unfiltered(&self) -> bool {
        self.search_term.is_empty() && self.active_filters().next().is_none() && self.date_range.is_open()
    }
    /// Stable fingerprint used as the view cache key.
    pub fn fingerprint(&self) -> u64 {
        // BTreeMap keeps the serialized form canonical
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        seahash::hash(&canonical)
    }
}
