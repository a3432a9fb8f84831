use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::model::{PipelineError, RawObservation};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One time series: unique, strictly increasing dates, each with an optional
/// finite value. A `None` is a missing observation, not a zero.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SeriesFrame {
    id: String,
    points: Vec<(NaiveDate, Option<f64>)>,
}

impl SeriesFrame {
    /// Builds a frame from points in any order. When a date repeats, the later
    /// point wins; non-finite values become missing.
    pub fn new(id: impl Into<String>, points: impl IntoIterator<Item = (NaiveDate, Option<f64>)>) -> Self {
        let indexed: BTreeMap<NaiveDate, Option<f64>> = points
            .into_iter()
            .map(|(date, value)| (date, value.filter(|v| v.is_finite())))
            .collect();

        Self {
            id: id.into(),
            points: indexed.into_iter().collect(),
        }
    }

    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            points: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[(NaiveDate, Option<f64>)] {
        &self.points
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.iter().map(|(date, _)| *date)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|(date, _)| *date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|(date, _)| *date)
    }

    /// Value observed at exactly `date`.
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |(d, _)| *d)
            .ok()
            .and_then(|idx| self.points[idx].1)
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.points.binary_search_by_key(&date, |(d, _)| *d).is_ok()
    }

    /// Number of points that carry a value.
    pub fn observed_count(&self) -> usize {
        self.points.iter().filter(|(_, v)| v.is_some()).count()
    }

    pub fn renamed(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Outcome of coercing one raw upstream value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coercion {
    Value(f64),
    /// The upstream explicitly reported no observation (`null`, `"."`, `""`).
    Missing,
    /// Present but not numeric; treated as missing and counted.
    Invalid,
}

impl Coercion {
    pub fn value(self) -> Option<f64> {
        match self {
            Coercion::Value(v) => Some(v),
            Coercion::Missing | Coercion::Invalid => None,
        }
    }
}

pub fn coerce_value(value: &serde_json::Value) -> Coercion {
    match value {
        serde_json::Value::Null => Coercion::Missing,
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(v) if v.is_finite() => Coercion::Value(v),
            _ => Coercion::Invalid,
        },
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed == "." {
                return Coercion::Missing;
            }
            match trimmed.parse::<f64>() {
                Ok(v) if v.is_finite() => Coercion::Value(v),
                _ => Coercion::Invalid,
            }
        }
        _ => Coercion::Invalid,
    }
}

/// Parses a date-axis entry. Accepts plain ISO dates and ISO date-times (the
/// time part is dropped); anything else fails for the whole series.
pub fn parse_date(series: &str, raw: &str) -> Result<NaiveDate, PipelineError> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
        return Ok(date);
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(dt.date());
        }
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.date_naive());
    }
    Err(PipelineError::Parse {
        series: series.to_string(),
        raw: raw.to_string(),
    })
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Frames extracted from a long table, plus how many values failed coercion.
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    pub frames: Vec<SeriesFrame>,
    pub coerced: usize,
}

impl Extracted {
    pub fn take(&mut self, id: &str) -> Option<SeriesFrame> {
        let idx = self.frames.iter().position(|f| f.id() == id)?;
        Some(self.frames.remove(idx))
    }
}

/// Splits a long `(id, date, value)` table into one frame per id, sorted by id.
/// Duplicate `(id, date)` rows resolve to the one that arrived last.
pub fn extract_frames(rows: &[RawObservation]) -> Result<Extracted, PipelineError> {
    let mut grouped: BTreeMap<&str, Vec<(NaiveDate, Option<f64>)>> = BTreeMap::new();
    let mut coerced = 0;

    for row in rows {
        let date = parse_date(&row.id, &row.date)?;
        let value = match coerce_value(&row.value) {
            Coercion::Invalid => {
                debug!("Non-numeric value {} for {} on {}, using null", row.value, row.id, row.date);
                coerced += 1;
                None
            }
            other => other.value(),
        };
        grouped.entry(row.id.as_str()).or_default().push((date, value));
    }

    let frames = grouped
        .into_iter()
        .map(|(id, points)| SeriesFrame::new(id, points))
        .collect();

    Ok(Extracted { frames, coerced })
}

#[cfg(test)]
pub(crate) fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_sorts_and_keeps_last_duplicate() {
        let frame = SeriesFrame::new(
            "GDP",
            vec![
                (date("2020-03-01"), Some(3.0)),
                (date("2020-01-01"), Some(1.0)),
                (date("2020-03-01"), Some(4.0)),
            ],
        );

        let dates: Vec<_> = frame.dates().collect();
        assert_eq!(dates, vec![date("2020-01-01"), date("2020-03-01")]);
        assert_eq!(frame.get(date("2020-03-01")), Some(4.0));
    }

    #[test]
    fn missing_values_are_kept_as_points() {
        let frame = SeriesFrame::new(
            "UNRATE",
            vec![(date("2020-01-01"), None), (date("2020-02-01"), Some(f64::NAN))],
        );

        assert_eq!(frame.len(), 2);
        assert_eq!(frame.observed_count(), 0);
        assert!(frame.contains_date(date("2020-02-01")));
        assert_eq!(frame.get(date("2020-02-01")), None);
    }

    #[test]
    fn coercion_distinguishes_missing_from_invalid() {
        assert_eq!(coerce_value(&json!("1.5")), Coercion::Value(1.5));
        assert_eq!(coerce_value(&json!(2)), Coercion::Value(2.0));
        assert_eq!(coerce_value(&json!(".")), Coercion::Missing);
        assert_eq!(coerce_value(&json!(null)), Coercion::Missing);
        assert_eq!(coerce_value(&json!("n/a")), Coercion::Invalid);
        assert_eq!(coerce_value(&json!("inf")), Coercion::Invalid);
        assert_eq!(coerce_value(&json!(true)), Coercion::Invalid);
    }

    #[test]
    fn parse_date_accepts_datetimes_and_rejects_garbage() {
        assert_eq!(parse_date("X", "2021-05-04").unwrap(), date("2021-05-04"));
        assert_eq!(parse_date("X", "2021-05-04 13:00:00").unwrap(), date("2021-05-04"));
        assert_eq!(parse_date("X", "2021-05-04T13:00:00Z").unwrap(), date("2021-05-04"));

        let err = parse_date("X", "04/05/2021").unwrap_err();
        assert!(matches!(err, PipelineError::Parse { ref series, .. } if series == "X"));
    }

    #[test]
    fn extract_resolves_duplicates_to_later_record() {
        let rows = vec![
            RawObservation::new("CPI", "2020-01-01", json!("100.0")),
            RawObservation::new("CPI", "2020-01-01", json!("101.5")),
            RawObservation::new("CPI", "2020-02-01", json!("102.0")),
        ];

        let extracted = extract_frames(&rows).unwrap();

        assert_eq!(extracted.frames.len(), 1);
        let cpi = &extracted.frames[0];
        assert_eq!(cpi.len(), 2);
        assert_eq!(cpi.get(date("2020-01-01")), Some(101.5));
    }

    #[test]
    fn extract_counts_coercions_and_fails_on_bad_dates() {
        let rows = vec![
            RawObservation::new("B", "2020-01-01", json!("oops")),
            RawObservation::new("A", "2020-01-01", json!(".")),
        ];
        let mut extracted = extract_frames(&rows).unwrap();
        assert_eq!(extracted.coerced, 1);
        assert_eq!(extracted.frames[0].id(), "A");
        assert!(extracted.take("B").is_some());
        assert!(extracted.take("B").is_none());

        let bad = vec![RawObservation::new("A", "not-a-date", json!("1"))];
        assert!(matches!(extract_frames(&bad), Err(PipelineError::Parse { .. })));
    }
}
