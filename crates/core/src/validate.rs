//! Stateless data-quality checks shared by every pipeline stage.
//!
//! Each check fails with its own error kind so callers can tell a calendar
//! defect from a null or a duplicate without parsing messages.

use crate::error::{Error, Result};
use crate::types::{month_index, month_start, Panel};
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Every required column is present.
pub fn check_schema<S: AsRef<str>, R: AsRef<str>>(present: &[S], required: &[R]) -> Result<()> {
    let present: BTreeSet<&str> = present.iter().map(|s| s.as_ref()).collect();
    let missing: Vec<&str> = required
        .iter()
        .map(|r| r.as_ref())
        .filter(|r| !present.contains(r))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::schema(format!("missing required columns: {}", missing.join(", "))))
    }
}

/// Each date is a month start exactly one calendar month after the previous.
pub fn check_monotonic_monthly(dates: &[NaiveDate]) -> Result<()> {
    for date in dates {
        if *date != month_start(*date) {
            return Err(Error::NotMonthStart(*date));
        }
    }
    for pair in dates.windows(2) {
        if month_index(pair[1]) - month_index(pair[0]) != 1 {
            return Err(Error::NonContiguous {
                previous: pair[0],
                next: pair[1],
            });
        }
    }
    Ok(())
}

/// No cell in any row is null or non-finite.
pub fn check_no_nulls(panel: &Panel) -> Result<()> {
    for column in panel.columns() {
        for (month, value) in panel.months().iter().zip(&column.values) {
            match value {
                Some(v) if v.is_finite() => {}
                _ => {
                    return Err(Error::NullValue {
                        column: column.name.clone(),
                        month: *month,
                    })
                }
            }
        }
    }
    Ok(())
}

/// The date sequence has no repeats.
pub fn check_no_duplicates(dates: &[NaiveDate]) -> Result<()> {
    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for date in dates {
        if !seen.insert(*date) {
            duplicates.insert(*date);
        }
    }
    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(Error::DuplicateDate {
            dates: duplicates.into_iter().collect(),
        })
    }
}

/// No date falls strictly after `as_of`.
pub fn check_no_future(dates: &[NaiveDate], as_of: NaiveDate) -> Result<()> {
    let future: Vec<NaiveDate> = dates.iter().copied().filter(|d| *d > as_of).collect();
    if future.is_empty() {
        Ok(())
    } else {
        Err(Error::FutureDate {
            dates: future,
            as_of,
        })
    }
}

/// Every value of the named columns is zero or positive.
pub fn check_non_negative<S: AsRef<str>>(panel: &Panel, columns: &[S]) -> Result<()> {
    for name in columns {
        let name = name.as_ref();
        let column = panel
            .column(name)
            .ok_or_else(|| Error::schema(format!("range check on missing column '{}'", name)))?;
        for (month, value) in panel.months().iter().zip(&column.values) {
            if let Some(v) = value {
                if *v < 0.0 {
                    return Err(Error::OutOfRange {
                        column: name.to_string(),
                        month: *month,
                        value: *v,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Panel-level checks: duplicates, calendar contiguity, nulls, future dates.
pub fn validate_panel(panel: &Panel, as_of: NaiveDate) -> Result<()> {
    check_no_duplicates(panel.months())?;
    check_monotonic_monthly(panel.months())?;
    check_no_nulls(panel)?;
    check_no_future(panel.months(), as_of)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Column;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_schema_reports_missing() {
        let err = check_schema(&["date", "wti"], &["date", "wti", "gdp"]).unwrap_err();
        assert_eq!(err.to_string(), "Schema error: missing required columns: gdp");
        assert!(check_schema(&["date", "wti"], &["wti"]).is_ok());
    }

    #[test]
    fn test_monthly_sequence_across_year_end() {
        let dates = vec![ymd(2023, 11, 1), ymd(2023, 12, 1), ymd(2024, 1, 1)];
        assert!(check_monotonic_monthly(&dates).is_ok());
    }

    #[test]
    fn test_monthly_sequence_gap() {
        let dates = vec![ymd(2023, 11, 1), ymd(2024, 1, 1)];
        assert!(matches!(
            check_monotonic_monthly(&dates),
            Err(Error::NonContiguous { previous, next })
                if previous == ymd(2023, 11, 1) && next == ymd(2024, 1, 1)
        ));
    }

    #[test]
    fn test_monthly_sequence_not_month_start() {
        let dates = vec![ymd(2023, 11, 1), ymd(2023, 12, 31)];
        assert!(matches!(
            check_monotonic_monthly(&dates),
            Err(Error::NotMonthStart(d)) if d == ymd(2023, 12, 31)
        ));
    }

    #[test]
    fn test_monthly_sequence_decreasing() {
        let dates = vec![ymd(2024, 2, 1), ymd(2024, 1, 1)];
        assert!(matches!(
            check_monotonic_monthly(&dates),
            Err(Error::NonContiguous { .. })
        ));
    }

    #[test]
    fn test_duplicates_reported_once() {
        let dates = vec![ymd(2024, 1, 1), ymd(2024, 1, 1), ymd(2024, 1, 1), ymd(2024, 2, 1)];
        assert!(matches!(
            check_no_duplicates(&dates),
            Err(Error::DuplicateDate { dates }) if dates == vec![ymd(2024, 1, 1)]
        ));
    }

    #[test]
    fn test_future_dates() {
        let dates = vec![ymd(2024, 1, 1), ymd(2024, 2, 1), ymd(2024, 3, 1)];
        assert!(check_no_future(&dates, ymd(2024, 3, 1)).is_ok());
        assert!(matches!(
            check_no_future(&dates, ymd(2024, 2, 15)),
            Err(Error::FutureDate { dates, .. }) if dates == vec![ymd(2024, 3, 1)]
        ));
    }

    #[test]
    fn test_nulls_and_ranges() {
        let panel = Panel::new(
            vec![ymd(2024, 1, 1), ymd(2024, 2, 1)],
            vec![
                Column::new("a", vec![Some(1.0), Some(f64::NAN)]),
                Column::new("b", vec![Some(-1.0), Some(2.0)]),
            ],
            None,
        )
        .unwrap();

        assert!(matches!(
            check_no_nulls(&panel),
            Err(Error::NullValue { column, month }) if column == "a" && month == ymd(2024, 2, 1)
        ));
        assert!(check_non_negative(&panel, &["a"]).is_ok());
        assert!(matches!(
            check_non_negative(&panel, &["b"]),
            Err(Error::OutOfRange { .. })
        ));
    }
}
