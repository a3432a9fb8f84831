use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::model::PipelineError;
use crate::series::frame::SeriesFrame;

pub const DATE_COLUMN: &str = "date";

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Wide table: one row per date, one column per series. Every column holds
/// exactly one value slot per date; unobserved cells are `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiSeriesTable {
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
}

impl MultiSeriesTable {
    pub fn with_dates(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        let mut dates: Vec<NaiveDate> = dates.into_iter().collect();
        dates.sort_unstable();
        dates.dedup();
        Self {
            dates,
            columns: Vec::new(),
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((*self.dates.first()?, *self.dates.last()?))
    }

    fn row_index(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    pub fn value(&self, date: NaiveDate, column: &str) -> Option<f64> {
        let idx = self.row_index(date)?;
        self.column(column).and_then(|values| values[idx])
    }

    /// The `series_id -> value` mapping for one date.
    pub fn row(&self, date: NaiveDate) -> Option<BTreeMap<&str, Option<f64>>> {
        let idx = self.row_index(date)?;
        Some(
            self.columns
                .iter()
                .map(|c| (c.name.as_str(), c.values[idx]))
                .collect(),
        )
    }

    /// Appends a column. Names are unique and the date column name is reserved.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Result<(), PipelineError> {
        let name = name.into();
        if name == DATE_COLUMN || self.has_column(&name) {
            return Err(PipelineError::ColumnCollision(name));
        }
        if values.len() != self.dates.len() {
            return Err(PipelineError::LengthMismatch {
                column: name,
                expected: self.dates.len(),
                got: values.len(),
            });
        }
        let values = values
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect();
        self.columns.push(Column { name, values });
        Ok(())
    }

    /// Left join on date: adds `frame` as a column named after it. Rows the
    /// frame does not cover stay `None`; frame dates outside the table are dropped.
    pub fn left_join(&mut self, frame: &SeriesFrame) -> Result<(), PipelineError> {
        let values = self.dates.iter().map(|date| frame.get(*date)).collect();
        self.push_column(frame.id(), values)
    }

    /// The column as a frame over every table date (unfilled rows are `None`).
    pub fn frame(&self, name: &str) -> Option<SeriesFrame> {
        let values = self.column(name)?;
        Some(SeriesFrame::new(
            name,
            self.dates.iter().copied().zip(values.iter().copied()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::frame::date;

    fn table() -> MultiSeriesTable {
        let mut table = MultiSeriesTable::with_dates(vec![date("2020-02-01"), date("2020-01-01"), date("2020-02-01")]);
        table.push_column("A", vec![Some(1.0), Some(2.0)]).unwrap();
        table
    }

    #[test]
    fn dates_are_sorted_and_unique() {
        let table = table();
        assert_eq!(table.dates(), &[date("2020-01-01"), date("2020-02-01")]);
        assert_eq!(table.date_range(), Some((date("2020-01-01"), date("2020-02-01"))));
    }

    #[test]
    fn push_column_rejects_collisions_and_bad_lengths() {
        let mut table = table();
        assert!(matches!(
            table.push_column("A", vec![None, None]),
            Err(PipelineError::ColumnCollision(_))
        ));
        assert!(matches!(
            table.push_column(DATE_COLUMN, vec![None, None]),
            Err(PipelineError::ColumnCollision(_))
        ));
        assert!(matches!(
            table.push_column("B", vec![None]),
            Err(PipelineError::LengthMismatch { expected: 2, got: 1, .. })
        ));
    }

    #[test]
    fn left_join_keeps_table_dates() {
        let mut table = table();
        let frame = SeriesFrame::new(
            "B",
            vec![(date("2020-02-01"), Some(5.0)), (date("2021-01-01"), Some(9.0))],
        );

        table.left_join(&frame).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.column("B").unwrap(), &[None, Some(5.0)]);
        let row = table.row(date("2020-02-01")).unwrap();
        assert_eq!(row["A"], Some(2.0));
        assert_eq!(row["B"], Some(5.0));
        assert_eq!(table.value(date("2021-01-01"), "B"), None);
    }

    #[test]
    fn frame_round_trips_column() {
        let mut table = table();
        table.push_column("C", vec![None, Some(f64::INFINITY)]).unwrap();

        let frame = table.frame("C").unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.observed_count(), 0);
        assert!(table.frame("missing").is_none());
    }
}
