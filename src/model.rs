// Core records shared between fetchers, storage and datasets, plus the error taxonomy.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One row of a long-format observation table as delivered by a fetcher.
///
/// `date` stays raw until extraction so a malformed date axis can be reported
/// against the series it came from. `value` keeps whatever JSON the upstream sent
/// (FRED uses strings, with `"."` for a missing observation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub id: String,
    pub date: String,
    pub value: serde_json::Value,
}

impl RawObservation {
    pub fn new(id: impl Into<String>, date: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            date: date.into(),
            value,
        }
    }
}

/// One end-of-day bar for a market symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    #[serde(default)]
    pub symbol: String,
    pub date: String,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub adjusted_close: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl PriceBar {
    pub const FIELDS: [&'static str; 6] = ["open", "high", "low", "close", "adjusted_close", "volume"];

    pub fn field(&self, name: &str) -> Option<f64> {
        match name {
            "open" => self.open,
            "high" => self.high,
            "low" => self.low,
            "close" => self.close,
            "adjusted_close" => self.adjusted_close,
            "volume" => self.volume,
            _ => None,
        }
    }
}

/// A scalar inside a metadata record. Storage rows can carry blobs, which are
/// not JSON-representable and go through the export fallback chain.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<&serde_json::Value> for MetaValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => MetaValue::Null,
            serde_json::Value::Bool(b) => MetaValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => MetaValue::Integer(i),
                None => n.as_f64().map(MetaValue::Real).unwrap_or(MetaValue::Null),
            },
            serde_json::Value::String(s) => MetaValue::Text(s.clone()),
            other => MetaValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

/// Descriptive attributes of one series or instrument, field name -> value.
/// Joined to exports by identifier, never merged into the numeric tables.
pub type MetaRecord = BTreeMap<String, MetaValue>;

/// Builds a record from a JSON object, keeping only `columns` (absent -> null).
pub fn meta_record_from_json(entry: &serde_json::Value, columns: &[&str]) -> MetaRecord {
    columns
        .iter()
        .map(|col| {
            let value = entry.get(*col).map(MetaValue::from).unwrap_or(MetaValue::Null);
            (col.to_string(), value)
        })
        .collect()
}

/// Returns the text value of `field`, if the record has one.
pub fn meta_text<'a>(record: &'a MetaRecord, field: &str) -> Option<&'a str> {
    match record.get(field) {
        Some(MetaValue::Text(s)) => Some(s.as_str()),
        _ => None,
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned {status} for {url}")]
    Status { status: u16, url: String },
    #[error("could not decode upstream payload: {0}")]
    Decode(String),
    #[error("upstream error: {0}")]
    Upstream(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("conversion error: {0}")]
    Conversion(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unparseable date {raw:?} in series {series}")]
    Parse { series: String, raw: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("column {0:?} is defined by more than one aligned table")]
    ColumnCollision(String),
    #[error("unknown column {0:?}")]
    UnknownColumn(String),
    #[error("column {column:?} has {got} values for {expected} dates")]
    LengthMismatch {
        column: String,
        expected: usize,
        got: usize,
    },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification api error: {0}")]
    Api(String),
    #[error("notification endpoint unreachable")]
    Unreachable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn meta_record_keeps_requested_columns_only() {
        let entry = json!({"id": "CPIAUCSL", "title": "CPI", "popularity": 95, "extra": true});
        let record = meta_record_from_json(&entry, &["id", "title", "popularity", "units"]);

        assert_eq!(record.len(), 4);
        assert_eq!(meta_text(&record, "id"), Some("CPIAUCSL"));
        assert_eq!(record["popularity"], MetaValue::Integer(95));
        assert_eq!(record["units"], MetaValue::Null);
        assert!(!record.contains_key("extra"));
    }

    #[test]
    fn price_bar_deserializes_eod_row() {
        let bar: PriceBar = serde_json::from_value(json!({
            "date": "2024-01-02", "open": 1.0, "high": 2.0, "low": 0.5,
            "close": 1.5, "adjusted_close": 1.4, "volume": 1000
        }))
        .unwrap();

        assert_eq!(bar.symbol, "");
        assert_eq!(bar.field("adjusted_close"), Some(1.4));
        assert_eq!(bar.field("volume"), Some(1000.0));
        assert_eq!(bar.field("missing"), None);
    }
}
