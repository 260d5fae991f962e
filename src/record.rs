//! Records as they arrive at the API boundary.
//!
//! A [`Record`] is an open mapping from field name to [`Value`]. The engine
//! never assumes a field exists; every accessor coerces and falls back
//! instead of failing, so that a malformed record only ever drops out of a
//! predicate or contributes nothing to a sum.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

// used for timestamps in records and date-range bounds
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as Json;

lazy_static! {
    static ref DATE_ONLY: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
    static ref ZONED: Regex = Regex::new(r"(?:[Zz]|[+-]\d{2}:?\d{2})$").unwrap();
}

/// Parses the timestamp shapes produced by the backend and by date pickers.
///
/// * `2024-03-01` is midnight of that day.
/// * `2024-03-01T10:15:00(.ffffff)` and the space separated form are taken as UTC.
/// * Zoned forms (`Z`, `+05:30`, `-0500`) are converted to UTC.
pub fn parse_time(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if DATE_ONLY.is_match(s) {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0));
    }
    if ZONED.is_match(s) {
        return DateTime::parse_from_rfc3339(s)
            .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z"))
            .ok()
            .map(|dt| dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Nested(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// String form used by free-text matching. Null and composite values have none.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.clone()),
            Value::Number(_) | Value::Bool(_) => Some(self.to_string()),
            _ => None,
        }
    }

    /// Numeric form used by aggregates. Text is parsed; anything else has none.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Date-time form used by date-range predicates. Numbers are epoch milliseconds.
    pub fn as_time(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Text(s) => parse_time(s),
            Value::Number(n) if n.is_finite() => {
                DateTime::from_timestamp_millis(*n as i64).map(|dt| dt.naive_utc())
            }
            _ => None,
        }
    }

    /// Ordering form of the value, computed once per row when sorting.
    pub fn sort_key(&self) -> SortKey {
        match self {
            Value::Number(n) => SortKey::Scalar(*n),
            Value::Text(s) => match parse_time(s) {
                Some(ts) => SortKey::Scalar(ts.and_utc().timestamp_millis() as f64),
                None => SortKey::Text(s.to_lowercase()),
            },
            Value::Bool(b) => SortKey::Bool(*b),
            Value::List(_) => SortKey::List,
            Value::Nested(_) => SortKey::Nested,
            Value::Null => SortKey::Null,
        }
    }

    /// Natural ordering of two present values: numbers and timestamps by
    /// magnitude, text case-insensitively.
    pub fn compare(&self, other: &Value) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }

    /// Strict equality used by dropdown filters: same kind and same value, case-sensitive.
    pub fn exact_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (a, b) => a == b,
        }
    }

    /// A filter value that selects nothing specific ("All categories").
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::List(_) | Value::Nested(_) => write!(f, "{}", Json::from(self)),
        }
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            Json::String(s) => Value::Text(s),
            Json::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => Value::Nested(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

impl From<&Value> for Json {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Json::from(*n as i64),
            Value::Number(n) => serde_json::Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null),
            Value::Text(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(Json::from).collect()),
            Value::Nested(map) => Json::Object(map.iter().map(|(k, v)| (k.clone(), Json::from(v))).collect()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::Text(s.to_owned()) }
}
impl From<String> for Value {
    fn from(s: String) -> Self { Value::Text(s) }
}
impl From<f64> for Value {
    fn from(n: f64) -> Self { Value::Number(n) }
}
impl From<i64> for Value {
    fn from(n: i64) -> Self { Value::Number(n as f64) }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Bool(b) }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Value::Null) }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Json::from(self).serialize(serializer)
    }
}
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Json::deserialize(deserializer).map(Value::from)
    }
}

/// How a value orders in a sorted column.
///
/// Numbers and text that reads as a timestamp share one scale, epoch
/// milliseconds, so a date column sorts by instant whatever format each
/// row uses. Across kinds: scalar < text < boolean < list < nested < null.
#[derive(Debug, Clone)]
pub enum SortKey {
    Scalar(f64),
    Text(String),
    Bool(bool),
    List,
    Nested,
    Null,
}

impl SortKey {
    fn rank(&self) -> u8 {
        match self {
            SortKey::Scalar(_) => 0,
            SortKey::Text(_) => 1,
            SortKey::Bool(_) => 2,
            SortKey::List => 3,
            SortKey::Nested => 4,
            SortKey::Null => 5,
        }
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Scalar(a), SortKey::Scalar(b)) => a.total_cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            (SortKey::Bool(a), SortKey::Bool(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}
impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for SortKey {}

/// One item, transaction or audit entry as returned by the data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }
    /// Builder style insertion, handy for fixtures.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_owned(), value.into());
        self
    }
    pub fn insert(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_owned(), value.into());
    }
    /// The value at `field`; explicit nulls count as absent.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }
    pub fn text(&self, field: &str) -> Option<String> {
        self.get(field).and_then(Value::as_text)
    }
    /// Numeric value at `field`, or 0 when absent or not numeric.
    pub fn number(&self, field: &str) -> f64 {
        self.get(field).and_then(Value::as_number).unwrap_or(0.0)
    }
    pub fn time(&self, field: &str) -> Option<NaiveDateTime> {
        self.get(field).and_then(Value::as_time)
    }
    pub fn id(&self) -> Option<i64> {
        self.get("id").and_then(Value::as_number).map(|n| n as i64)
    }
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }
    pub fn len(&self) -> usize {
        self.fields.len()
    }
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl TryFrom<Json> for Record {
    type Error = crate::error::InvguardError;
    fn try_from(json: Json) -> crate::error::Result<Self> {
        match Value::from(json) {
            Value::Nested(fields) => Ok(Record { fields }),
            other => Err(crate::error::InvguardError::Decode(format!("expected a JSON object, found {}", other))),
        }
    }
}

/// Decodes a JSON array of objects. Non-object elements are skipped with a warning.
pub fn records_from_json(json: Json) -> crate::error::Result<Vec<Record>> {
    let Json::Array(items) = json else {
        return Err(crate::error::InvguardError::Decode("expected a JSON array of records".into()));
    };
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match Record::try_from(item) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(error=%e, "skipping malformed record"),
        }
    }
    Ok(records)
}
