// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Error, bail};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::str::FromStr;
use time::{Duration, OffsetDateTime};

pub const STATUS_FIELD: &str = "Status";
pub const DEFAULT_ID_FIELD: &str = "ID";
pub const MAX_CELL_CHARS: usize = 36;
pub const CACHE_TTL: Duration = Duration::minutes(5);

/// A single scalar cell. Nested JSON is flattened to its compact text so a
/// row never carries structure the table cannot show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(text) => text.trim().is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(value) => value.to_string(),
            Self::Number(value) => value.to_string(),
            Self::Text(value) => value.clone(),
        }
    }
}

impl From<Value> for CellValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            // An empty list carries no text, same as an empty cell.
            Value::Array(items) if items.is_empty() => Self::Null,
            Value::Bool(value) => Self::Bool(value),
            Value::Number(value) => Self::Number(value),
            Value::String(value) => Self::Text(value),
            nested @ (Value::Array(_) | Value::Object(_)) => Self::Text(nested.to_string()),
        }
    }
}

impl From<CellValue> for Value {
    fn from(value: CellValue) -> Self {
        match value {
            CellValue::Null => Value::Null,
            CellValue::Bool(value) => Value::Bool(value),
            CellValue::Number(value) => Value::Number(value),
            CellValue::Text(value) => Value::String(value),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

/// One record from the row source. Field order is the order the source sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    fields: IndexMap<String, CellValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<CellValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&CellValue> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.fields
            .iter()
            .map(|(field, value)| (field.as_str(), value))
    }

    pub fn first_value(&self) -> Option<&CellValue> {
        self.fields.first().map(|(_, value)| value)
    }

    /// True when every value is null or whitespace. An empty row is blank.
    pub fn is_blank(&self) -> bool {
        self.fields.values().all(CellValue::is_blank)
    }

    /// Lower-cased `Status` text; a missing or null status reads as "".
    pub fn status_text(&self) -> String {
        self.get(STATUS_FIELD)
            .map(CellValue::display)
            .unwrap_or_default()
            .to_lowercase()
    }

    pub fn status_kind(&self) -> StatusKind {
        StatusKind::classify(&self.status_text())
    }
}

impl<K, V> FromIterator<(K, V)> for Row
where
    K: Into<String>,
    V: Into<CellValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    New,
    Pending,
    Closed,
    Other,
}

impl StatusKind {
    pub fn classify(status: &str) -> Self {
        match status {
            "new" => Self::New,
            "pending" => Self::Pending,
            "closed" => Self::Closed,
            _ => Self::Other,
        }
    }

    pub const fn priority(self) -> u8 {
        match self {
            Self::New => 1,
            Self::Pending => 2,
            Self::Closed => 3,
            Self::Other => 99,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Pending => "pending",
            Self::Closed => "closed",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    New,
    Pending,
    Closed,
    Other,
}

impl StatusFilter {
    pub const ALL: [Self; 5] = [Self::All, Self::New, Self::Pending, Self::Closed, Self::Other];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::New => "new",
            Self::Pending => "pending",
            Self::Closed => "closed",
            Self::Other => "other",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::New => "New",
            Self::Pending => "Pending",
            Self::Closed => "Closed",
            Self::Other => "Other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let lower = value.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|filter| filter.as_str() == lower)
    }

    /// `All` keeps everything; any other filter is an exact match on the
    /// lower-cased status text.
    pub fn matches(self, row: &Row) -> bool {
        match self {
            Self::All => true,
            other => row.status_text() == other.as_str(),
        }
    }

    pub fn rotate(self, delta: isize) -> Self {
        let filters = Self::ALL;
        let current = filters
            .iter()
            .position(|filter| *filter == self)
            .unwrap_or(0) as isize;
        let len = filters.len() as isize;
        filters[(current + delta).rem_euclid(len) as usize]
    }
}

impl FromStr for StatusFilter {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match Self::parse(value) {
            Some(filter) => Ok(filter),
            None => bail!(
                "unknown status filter {value:?}; use one of: all, new, pending, closed, other"
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

/// The persisted snapshot. Serialized as `{"capturedAt": <epoch ms>, "rows": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(rename = "capturedAt", with = "epoch_millis")]
    pub captured_at: OffsetDateTime,
    pub rows: Vec<Row>,
}

impl CacheEntry {
    pub fn new(captured_at: OffsetDateTime, rows: Vec<Row>) -> Self {
        Self { captured_at, rows }
    }

    pub fn age(&self, now: OffsetDateTime) -> Duration {
        now - self.captured_at
    }

    pub fn freshness(&self, now: OffsetDateTime) -> Freshness {
        if self.age(now) < CACHE_TTL {
            Freshness::Fresh
        } else {
            Freshness::Stale
        }
    }
}

mod epoch_millis {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;

    pub fn serialize<S: Serializer>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = value.unix_timestamp_nanos() / 1_000_000;
        serializer.serialize_i64(millis as i64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OffsetDateTime, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
            .map_err(D::Error::custom)
    }
}
