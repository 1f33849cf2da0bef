//! Collector rows to typed raw series.
//!
//! Collectors hand over loosely-typed tabular rows (JSON objects with a date
//! column and one value column). The schema is checked here, once; everything
//! downstream works on [`RawSeries`].

use chrono::NaiveDate;
use mfpanel_core::{Cadence, Error, Observation, RawSeries, Result};
use serde_json::Value;

/// Parse a date in one of the layouts collectors emit.
///
/// Accepts `YYYY-MM-DD` (optionally followed by a time part), `YYYY-MM`
/// and a bare `YYYY`.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Some(head) = raw.get(..10) {
        if let Ok(d) = NaiveDate::parse_from_str(head, "%Y-%m-%d") {
            return Some(d);
        }
    }
    if raw.len() == 7 {
        return NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d").ok();
    }
    if raw.len() == 4 {
        let year: i32 = raw.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, 1, 1);
    }
    None
}

fn parse_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Convert collector rows into a raw series sorted by date.
///
/// Column names are trimmed and lower-cased. The date column is the first
/// one whose name contains `date`; the value column is `value` when present,
/// otherwise the only other column. Rows whose fields are all null are
/// skipped.
pub fn parse_rows(name: &str, cadence: Cadence, rows: &[Value]) -> Result<RawSeries> {
    let mut observations = Vec::with_capacity(rows.len());

    for (i, row) in rows.iter().enumerate() {
        let object = row
            .as_object()
            .ok_or_else(|| Error::schema(format!("{}: row {} is not an object", name, i)))?;

        if object.values().all(Value::is_null) {
            continue;
        }

        let fields: Vec<(String, &Value)> = object
            .iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v))
            .collect();

        let date_idx = fields
            .iter()
            .position(|(k, _)| k.contains("date"))
            .ok_or_else(|| Error::schema(format!("{}: row {} has no date column", name, i)))?;

        let value_idx = match fields.iter().position(|(k, _)| k == "value") {
            Some(idx) => idx,
            None => {
                let others: Vec<usize> = (0..fields.len()).filter(|j| *j != date_idx).collect();
                match others.as_slice() {
                    [only] => *only,
                    [] => {
                        return Err(Error::schema(format!(
                            "{}: row {} has no value column",
                            name, i
                        )))
                    }
                    _ => {
                        return Err(Error::schema(format!(
                            "{}: row {} has several candidate value columns",
                            name, i
                        )))
                    }
                }
            }
        };

        let (date_key, date_raw) = &fields[date_idx];
        let date = date_raw
            .as_str()
            .and_then(parse_date)
            .ok_or_else(|| {
                Error::schema(format!("{}: row {} has unparsable {} {}", name, i, date_key, date_raw))
            })?;

        let (value_key, value_raw) = &fields[value_idx];
        let value = parse_value(value_raw).ok_or_else(|| {
            Error::schema(format!(
                "{}: non-numeric {} {} at {}",
                name, value_key, value_raw, date
            ))
        })?;

        observations.push(Observation::new(date, value));
    }

    // Some APIs deliver newest first.
    observations.sort_by_key(|o| o.date);

    Ok(RawSeries::new(name, cadence, observations))
}
