// Puts several series on one date axis without fabricating values.
use chrono::NaiveDate;

use crate::model::PipelineError;
use crate::series::frame::SeriesFrame;
use crate::series::table::MultiSeriesTable;

pub struct Aligner;

impl Aligner {
    /// Pivots frames onto the union of their dates, one column per frame.
    /// A frame with no points still gets an (empty-valued) column.
    pub fn union(frames: &[SeriesFrame]) -> Result<MultiSeriesTable, PipelineError> {
        let dates = frames.iter().flat_map(|f| f.dates());
        let mut table = MultiSeriesTable::with_dates(dates);
        for frame in frames {
            table.left_join(frame)?;
        }
        Ok(table)
    }

    /// Overlays tables from different domains on a contiguous daily calendar
    /// spanning the earliest to the latest date of any input. Cells are filled
    /// by exact date match only, so a monthly series stays null between
    /// releases. Two inputs defining the same column name is an error.
    pub fn daily(tables: &[&MultiSeriesTable]) -> Result<MultiSeriesTable, PipelineError> {
        let range = tables
            .iter()
            .filter_map(|t| t.date_range())
            .reduce(|(lo, hi), (min, max)| (lo.min(min), hi.max(max)));

        let calendar = match range {
            Some((start, end)) => daily_calendar(start, end),
            None => Vec::new(),
        };

        let mut aligned = MultiSeriesTable::with_dates(calendar);
        for table in tables {
            for name in table.column_names() {
                if let Some(frame) = table.frame(name) {
                    aligned.left_join(&frame)?;
                }
            }
        }
        Ok(aligned)
    }
}

/// Every calendar day from `start` to `end`, inclusive.
pub fn daily_calendar(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}
