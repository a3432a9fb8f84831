use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::series::frame::SeriesFrame;

/// Trailing period-over-period change labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Periodicity {
    YoY,
    QoQ,
    MoM,
}

impl Periodicity {
    pub const ALL: [Periodicity; 3] = [Periodicity::YoY, Periodicity::QoQ, Periodicity::MoM];

    pub const fn months(self) -> u32 {
        match self {
            Periodicity::YoY => 12,
            Periodicity::QoQ => 3,
            Periodicity::MoM => 1,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Periodicity::YoY => "YoY",
            Periodicity::QoQ => "QoQ",
            Periodicity::MoM => "MoM",
        }
    }

    /// Name of the derived column, e.g. `YoY_CPIAUCSL`.
    pub fn column_name(self, source: &str) -> String {
        format!("{}_{}", self.label(), source)
    }
}

impl fmt::Display for Periodicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
#[error("unknown periodicity {0:?}, expected one of YoY, QoQ, MoM")]
pub struct UnknownPeriodicity(pub String);

impl FromStr for Periodicity {
    type Err = UnknownPeriodicity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Periodicity::ALL
            .into_iter()
            .find(|p| p.label() == s)
            .ok_or_else(|| UnknownPeriodicity(s.to_string()))
    }
}

pub struct ChangeCalculator;

impl ChangeCalculator {
    /// Trailing `months`-month percentage change, one value per date of `series`:
    /// `(value[d] - value[d - months]) / value[d - months]`.
    ///
    /// The reference is found by shifting every source date forward by whole
    /// calendar months (month-end clamped, so Jan 31 + 1 month is Feb 28/29) and
    /// matching exactly. When several source dates clamp onto the same day, the
    /// latest observed one is the reference; null points never shadow it. A
    /// missing reference, a zero reference or a non-finite result gives `None`.
    pub fn compute_change(series: &SeriesFrame, months: u32) -> Vec<(NaiveDate, Option<f64>)> {
        let offset = Months::new(months);

        let mut landed: HashMap<NaiveDate, f64> = HashMap::with_capacity(series.len());
        for (date, value) in series.points() {
            let Some(value) = value else { continue };
            if let Some(target) = date.checked_add_months(offset) {
                landed.insert(target, *value);
            }
        }

        series
            .points()
            .iter()
            .map(|(date, current)| {
                let reference = landed.get(date).copied();
                let change = current.zip(reference).and_then(|(cur, base)| pct_change(cur, base));
                (*date, change)
            })
            .collect()
    }

    /// The change series for `periodicity`, named `{label}_{series id}`.
    pub fn compute(series: &SeriesFrame, periodicity: Periodicity) -> SeriesFrame {
        SeriesFrame::new(
            periodicity.column_name(series.id()),
            Self::compute_change(series, periodicity.months()),
        )
    }
}

fn pct_change(current: f64, base: f64) -> Option<f64> {
    if base == 0.0 {
        return None;
    }
    let change = (current - base) / base;
    change.is_finite().then_some(change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::frame::date;

    fn frame(points: &[(&str, Option<f64>)]) -> SeriesFrame {
        SeriesFrame::new("S", points.iter().map(|(d, v)| (date(d), *v)))
    }

    #[test]
    fn yoy_matches_exact_year_earlier_value() {
        let series = frame(&[("2019-01-31", Some(100.0)), ("2020-01-31", Some(110.0))]);

        let change = ChangeCalculator::compute(&series, Periodicity::YoY);

        assert_eq!(change.id(), "YoY_S");
        assert_eq!(change.get(date("2019-01-31")), None);
        let yoy = change.get(date("2020-01-31")).unwrap();
        assert!((yoy - 0.10).abs() < 1e-9);
    }

    #[test]
    fn missing_reference_gives_null() {
        let series = frame(&[("2019-02-28", Some(90.0)), ("2020-01-31", Some(100.0))]);

        let change = ChangeCalculator::compute_change(&series, 12);

        assert_eq!(change, vec![(date("2019-02-28"), None), (date("2020-01-31"), None)]);
    }

    #[test]
    fn zero_reference_gives_null_not_infinity() {
        let series = frame(&[("2019-06-30", Some(0.0)), ("2020-06-30", Some(50.0))]);

        let change = ChangeCalculator::compute(&series, Periodicity::YoY);

        assert_eq!(change.get(date("2020-06-30")), None);
        assert!(change.points().iter().all(|(_, v)| v.is_none_or(|x| x.is_finite())));
    }

    #[test]
    fn missing_current_value_gives_null() {
        let series = frame(&[("2020-01-01", Some(10.0)), ("2020-02-01", None)]);

        let change = ChangeCalculator::compute(&series, Periodicity::MoM);

        assert_eq!(change.len(), 2);
        assert_eq!(change.get(date("2020-02-01")), None);
    }

    #[test]
    fn month_end_dates_clamp_and_latest_source_wins() {
        let series = frame(&[
            ("2020-01-30", Some(50.0)),
            ("2020-01-31", Some(100.0)),
            ("2020-02-29", Some(120.0)),
        ]);

        let change = ChangeCalculator::compute(&series, Periodicity::MoM);

        let mom = change.get(date("2020-02-29")).unwrap();
        assert!((mom - 0.2).abs() < 1e-9);
    }

    #[test]
    fn null_points_in_a_clamp_window_do_not_hide_the_reference() {
        let sparse = frame(&[("2019-01-30", Some(100.0)), ("2019-02-28", Some(110.0))]);
        let padded = frame(&[
            ("2019-01-30", Some(100.0)),
            ("2019-01-31", None),
            ("2019-02-28", Some(110.0)),
        ]);

        let sparse_mom = ChangeCalculator::compute(&sparse, Periodicity::MoM);
        let padded_mom = ChangeCalculator::compute(&padded, Periodicity::MoM);

        let expected = sparse_mom.get(date("2019-02-28")).unwrap();
        assert!((expected - 0.1).abs() < 1e-9);
        assert_eq!(padded_mom.get(date("2019-02-28")), Some(expected));
        assert_eq!(padded_mom.get(date("2019-01-31")), None);
    }

    #[test]
    fn quarterly_offset_uses_three_months() {
        let series = frame(&[
            ("2020-01-01", Some(200.0)),
            ("2020-02-01", Some(1.0)),
            ("2020-04-01", Some(150.0)),
        ]);

        let change = ChangeCalculator::compute(&series, Periodicity::QoQ);

        let qoq = change.get(date("2020-04-01")).unwrap();
        assert!((qoq + 0.25).abs() < 1e-9);
    }

    #[test]
    fn periodicity_labels_round_trip() {
        for p in Periodicity::ALL {
            assert_eq!(p.label().parse::<Periodicity>().unwrap(), p);
        }
        assert!("WoW".parse::<Periodicity>().is_err());
        assert_eq!(Periodicity::QoQ.column_name("GDP"), "QoQ_GDP");
        assert_eq!(serde_json::to_string(&Periodicity::MoM).unwrap(), "\"MoM\"");
    }
}
