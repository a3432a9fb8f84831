// JSON-safe export: ISO dates, nulls for non-finite numbers, scalar-only metadata.
use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::model::{MetaRecord, MetaValue};
use crate::series::frame::format_date;
use crate::series::table::{DATE_COLUMN, MultiSeriesTable};

pub type WireRecord = Map<String, Value>;

/// Export of one requested identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPayload {
    pub meta: Vec<WireRecord>,
    pub data: BTreeMap<String, Vec<Value>>,
}

/// Identifier -> payload. Keys and column names are ordered maps, so the
/// encoded JSON does not depend on the order transforms were applied in.
pub type WirePayload = BTreeMap<String, SeriesPayload>;

/// Finite numbers become JSON numbers; NaN, infinities and `None` become null.
pub fn number(value: Option<f64>) -> Value {
    value
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Converts tables and records to wire values, counting values that needed
/// the fallback cast chain.
#[derive(Debug, Default)]
pub struct WireEncoder {
    fallbacks: usize,
}

impl WireEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fallbacks(&self) -> usize {
        self.fallbacks
    }

    /// Scalars pass through. Anything else is cast to a number if it reads as
    /// a finite one, otherwise to a string. Never fails.
    pub fn meta_value(&mut self, value: &MetaValue) -> Value {
        match value {
            MetaValue::Null => Value::Null,
            MetaValue::Bool(b) => Value::Bool(*b),
            MetaValue::Integer(i) => Value::from(*i),
            MetaValue::Real(r) => number(Some(*r)),
            MetaValue::Text(s) => Value::String(s.clone()),
            MetaValue::Bytes(bytes) => {
                self.fallbacks += 1;
                let text = String::from_utf8_lossy(bytes);
                match text.trim().parse::<f64>().ok().and_then(Number::from_f64) {
                    Some(n) => Value::Number(n),
                    None => {
                        debug!("Metadata value is not a scalar, exporting as string");
                        Value::String(text.into_owned())
                    }
                }
            }
        }
    }

    pub fn record(&mut self, record: &MetaRecord) -> WireRecord {
        record
            .iter()
            .map(|(key, value)| (key.clone(), self.meta_value(value)))
            .collect()
    }

    /// Records whose `key_field` is the text `id`.
    pub fn records_for(&mut self, records: &[MetaRecord], key_field: &str, id: &str) -> Vec<WireRecord> {
        records
            .iter()
            .filter(|r| matches!(r.get(key_field), Some(MetaValue::Text(k)) if k == id))
            .map(|r| self.record(r))
            .collect()
    }

    /// Column name -> values, with a `date` column of ISO dates. `columns`
    /// selects which columns to export; `None` exports all of them.
    pub fn table_data(&mut self, table: &MultiSeriesTable, columns: Option<&[String]>) -> BTreeMap<String, Vec<Value>> {
        let mut data = BTreeMap::new();
        data.insert(
            DATE_COLUMN.to_string(),
            table
                .dates()
                .iter()
                .map(|d| Value::String(format_date(*d)))
                .collect(),
        );

        for column in table.columns() {
            if columns.is_some_and(|wanted| !wanted.contains(&column.name)) {
                continue;
            }
            data.insert(
                column.name.clone(),
                column.values.iter().map(|v| number(*v)).collect(),
            );
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::frame::date;

    #[test]
    fn non_finite_numbers_become_null() {
        assert_eq!(number(Some(f64::NAN)), Value::Null);
        assert_eq!(number(Some(f64::INFINITY)), Value::Null);
        assert_eq!(number(Some(f64::NEG_INFINITY)), Value::Null);
        assert_eq!(number(None), Value::Null);
        assert_eq!(number(Some(0.5)), serde_json::json!(0.5));
    }

    #[test]
    fn bytes_fall_back_to_number_then_string() {
        let mut encoder = WireEncoder::new();

        assert_eq!(encoder.meta_value(&MetaValue::Bytes(b" 42.5".to_vec())), serde_json::json!(42.5));
        assert_eq!(encoder.meta_value(&MetaValue::Bytes(b"abc".to_vec())), serde_json::json!("abc"));
        assert_eq!(encoder.meta_value(&MetaValue::Bytes(vec![0xff, 0xfe])), Value::String("\u{fffd}\u{fffd}".into()));
        assert_eq!(encoder.meta_value(&MetaValue::Real(f64::NAN)), Value::Null);
        assert_eq!(encoder.fallbacks(), 3);
    }

    #[test]
    fn records_are_filtered_by_key() {
        let mut a = MetaRecord::new();
        a.insert("id".into(), MetaValue::from("A"));
        a.insert("popularity".into(), MetaValue::Integer(3));
        let mut b = MetaRecord::new();
        b.insert("id".into(), MetaValue::from("B"));

        let mut encoder = WireEncoder::new();
        let records = encoder.records_for(&[a, b], "id", "A");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["popularity"], serde_json::json!(3));
    }

    #[test]
    fn table_data_has_iso_dates_and_no_non_finite_values() {
        let mut table = MultiSeriesTable::with_dates(vec![date("2020-01-01"), date("2020-01-02")]);
        table.push_column("A", vec![Some(1.0), None]).unwrap();
        table.push_column("B", vec![Some(2.0), Some(3.0)]).unwrap();

        let mut encoder = WireEncoder::new();
        let data = encoder.table_data(&table, Some(&["A".to_string()]));

        assert_eq!(data["date"], vec![serde_json::json!("2020-01-01"), serde_json::json!("2020-01-02")]);
        assert_eq!(data["A"], vec![serde_json::json!(1.0), Value::Null]);
        assert!(!data.contains_key("B"));

        let json = serde_json::to_string(&encoder.table_data(&table, None)).unwrap();
        assert!(!json.contains("NaN") && !json.contains("inf"));
    }
}
