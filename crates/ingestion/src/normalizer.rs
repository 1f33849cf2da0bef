//! Frequency normalization onto the monthly grid.
//!
//! Every rule only ever looks backwards: a month is filled from observations
//! dated inside it or before it, never after.

use chrono::{Duration, NaiveDate};
use mfpanel_core::{
    add_months, month_start, months_between, validate, Cadence, Error, Month, MonthlySeries,
    NormalizationRule, RawSeries, Result, SourceConfig,
};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Running mean of the observations falling into one month.
#[derive(Debug, Clone, Default)]
struct MonthBucket {
    sum: f64,
    count: u32,
}

impl MonthBucket {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        if self.count > 0 {
            Some(self.sum / self.count as f64)
        } else {
            None
        }
    }
}

/// Input checks common to every rule.
fn check_raw(series: &RawSeries) -> Result<()> {
    if series.is_empty() {
        return Err(Error::schema(format!("series '{}' has no observations", series.name)));
    }
    for obs in &series.observations {
        if !obs.value.is_finite() {
            return Err(Error::schema(format!(
                "series '{}' has a non-numeric value at {}",
                series.name, obs.date
            )));
        }
    }
    let dates = series.dates();
    validate::check_no_duplicates(&dates)?;
    for pair in dates.windows(2) {
        if pair[1] < pair[0] {
            return Err(Error::schema(format!(
                "series '{}' is not in date order ({} after {})",
                series.name, pair[1], pair[0]
            )));
        }
    }
    Ok(())
}

/// Months of `series` that fall after `as_of`.
fn check_raw_not_future(series: &RawSeries, as_of: NaiveDate) -> Result<()> {
    let months: Vec<Month> = series
        .observations
        .iter()
        .map(|o| month_start(o.date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    validate::check_no_future(&months, as_of).map_err(|e| {
        warn!(series = %series.name, as_of = %as_of, "series has future-dated observations");
        e
    })
}

/// Turn month buckets into a series, failing on the first empty month.
fn buckets_to_series(name: &str, buckets: &BTreeMap<Month, MonthBucket>) -> Result<MonthlySeries> {
    let (first, last) = match (buckets.keys().next(), buckets.keys().next_back()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return Err(Error::schema(format!("series '{}' has no observations", name))),
    };

    let span = months_between(first, last);
    let mut values = Vec::with_capacity(span as usize + 1);
    for offset in 0..=span {
        let month = add_months(first, offset)
            .ok_or_else(|| Error::invariant("month out of calendar range"))?;
        let mean = buckets
            .get(&month)
            .and_then(MonthBucket::mean)
            .ok_or_else(|| Error::gap(name, month))?;
        values.push(mean);
    }

    MonthlySeries::from_values(name, first, values)
}

/// Arithmetic mean per calendar month.
fn monthly_mean(series: &RawSeries) -> Result<MonthlySeries> {
    let mut buckets: BTreeMap<Month, MonthBucket> = BTreeMap::new();
    for obs in &series.observations {
        buckets.entry(month_start(obs.date)).or_default().add(obs.value);
    }
    buckets_to_series(&series.name, &buckets)
}

/// Carry each observation forward day by day up to the last observation,
/// then average per calendar month.
fn forward_fill_mean(series: &RawSeries) -> Result<MonthlySeries> {
    let obs = &series.observations;
    let (first, last) = match (obs.first(), obs.last()) {
        (Some(f), Some(l)) => (f.date, l.date),
        _ => return Err(Error::schema(format!("series '{}' has no observations", series.name))),
    };

    let mut buckets: BTreeMap<Month, MonthBucket> = BTreeMap::new();
    let mut next = 0;
    let mut current = obs[0].value;
    let mut day = first;
    while day <= last {
        while next < obs.len() && obs[next].date <= day {
            current = obs[next].value;
            next += 1;
        }
        buckets.entry(month_start(day)).or_default().add(current);
        day += Duration::days(1);
    }

    buckets_to_series(&series.name, &buckets)
}

/// Hold each knot over the months it covers and until the next knot.
///
/// The grid starts at the first knot; nothing is extrapolated backwards.
fn forward_fill(series: &RawSeries, cadence: Cadence) -> Result<MonthlySeries> {
    let knots: Vec<(Month, f64)> = series
        .observations
        .iter()
        .map(|o| (month_start(o.date), o.value))
        .collect();
    let knot_months: Vec<Month> = knots.iter().map(|(m, _)| *m).collect();
    validate::check_no_duplicates(&knot_months)?;

    let (first, last) = match (knots.first(), knots.last()) {
        (Some(f), Some(l)) => (f.0, l.0),
        _ => return Err(Error::schema(format!("series '{}' has no observations", series.name))),
    };
    let end = add_months(last, cadence.months_covered() as i32 - 1)
        .ok_or_else(|| Error::invariant("month out of calendar range"))?;

    let span = months_between(first, end);
    let mut values = Vec::with_capacity(span as usize + 1);
    let mut next = 0;
    let mut held: Option<f64> = None;
    for offset in 0..=span {
        let month = add_months(first, offset)
            .ok_or_else(|| Error::invariant("month out of calendar range"))?;
        while next < knots.len() && knots[next].0 <= month {
            held = Some(knots[next].1);
            next += 1;
        }
        values.push(held.ok_or_else(|| Error::gap(&series.name, month))?);
    }

    MonthlySeries::from_values(&series.name, first, values)
}

/// Already-monthly input: truncate stamps to the month and validate.
fn pass_through(series: &RawSeries) -> Result<MonthlySeries> {
    let months: Vec<NaiveDate> = series.observations.iter().map(|o| month_start(o.date)).collect();
    validate::check_no_duplicates(&months)?;
    validate::check_monotonic_monthly(&months)?;

    let map: BTreeMap<Month, f64> = months
        .into_iter()
        .zip(series.observations.iter().map(|o| o.value))
        .collect();
    MonthlySeries::from_map(&series.name, map)
}

/// Convert one raw series to a monthly series using `rule`.
///
/// `cadence` is the caller's declaration; it is never inferred from the
/// timestamp spacing.
pub fn normalize(series: &RawSeries, cadence: Cadence, rule: NormalizationRule) -> Result<MonthlySeries> {
    if series.cadence != cadence {
        warn!(
            series = %series.name,
            tagged = %series.cadence,
            declared = %cadence,
            "raw series cadence tag differs from declared cadence"
        );
    }
    check_raw(series)?;

    let monthly = match rule {
        NormalizationRule::Mean => monthly_mean(series)?,
        NormalizationRule::ForwardFillMean => forward_fill_mean(series)?,
        NormalizationRule::ForwardFill => forward_fill(series, cadence)?,
        NormalizationRule::PassThrough => pass_through(series)?,
    };

    info!(
        series = %series.name,
        cadence = %cadence,
        rule = %rule,
        start = %monthly.first_month(),
        end = %monthly.last_month(),
        months = monthly.len(),
        "normalized series"
    );
    Ok(monthly)
}

/// Normalize every configured source concurrently.
///
/// Each result is renamed to the source's canonical column. Observations in
/// a month after `as_of` fail their series with `FutureDate`. The call
/// returns only after every source has finished; the first failure fails
/// the batch.
pub fn normalize_all(
    sources: &[SourceConfig],
    raws: &[RawSeries],
    as_of: NaiveDate,
) -> Result<BTreeMap<String, MonthlySeries>> {
    let by_name: HashMap<&str, &RawSeries> = raws.iter().map(|r| (r.name.as_str(), r)).collect();

    for raw in raws {
        if !sources.iter().any(|s| s.name == raw.name) {
            debug!(series = %raw.name, "ignoring raw series with no configured source");
        }
    }

    let jobs: Vec<(&SourceConfig, &RawSeries)> = sources
        .iter()
        .map(|source| {
            by_name
                .get(source.name.as_str())
                .map(|raw| (source, *raw))
                .ok_or_else(|| Error::schema(format!("no raw series for source '{}'", source.name)))
        })
        .collect::<Result<_>>()?;

    let normalized: Vec<(String, MonthlySeries)> = jobs
        .par_iter()
        .map(|(source, raw)| {
            check_raw_not_future(raw, as_of)?;
            let monthly = normalize(raw, source.cadence, source.effective_rule())?;
            Ok((source.column.clone(), monthly.renamed(&source.column)))
        })
        .collect::<Result<_>>()?;

    Ok(normalized.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mfpanel_core::Observation;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn raw(name: &str, cadence: Cadence, points: &[(NaiveDate, f64)]) -> RawSeries {
        RawSeries::new(
            name,
            cadence,
            points.iter().map(|(d, v)| Observation::new(*d, *v)).collect(),
        )
    }

    #[test]
    fn test_daily_mean_per_month() {
        let series = raw(
            "wti",
            Cadence::Daily,
            &[
                (ymd(2024, 1, 2), 70.0),
                (ymd(2024, 1, 3), 72.0),
                (ymd(2024, 1, 31), 74.0),
                (ymd(2024, 2, 1), 80.0),
            ],
        );
        let monthly = normalize(&series, Cadence::Daily, NormalizationRule::Mean).unwrap();
        assert_eq!(monthly.first_month(), ymd(2024, 1, 1));
        assert_eq!(monthly.len(), 2);
        assert_relative_eq!(monthly.values()[0], 72.0);
        assert_relative_eq!(monthly.values()[1], 80.0);
    }

    #[test]
    fn test_daily_missing_month_is_gap() {
        let series = raw(
            "wti",
            Cadence::Daily,
            &[(ymd(2024, 1, 15), 70.0), (ymd(2024, 3, 15), 72.0)],
        );
        let err = normalize(&series, Cadence::Daily, NormalizationRule::Mean).unwrap_err();
        assert!(matches!(err, Error::Gap { month, .. } if month == ymd(2024, 2, 1)));
    }

    #[test]
    fn test_weekly_forward_fill_never_looks_ahead() {
        // Week of Jan 29 carries into Feb until the Feb 5 print.
        let series = raw(
            "inventory",
            Cadence::Weekly,
            &[
                (ymd(2024, 1, 29), 100.0),
                (ymd(2024, 2, 5), 200.0),
                (ymd(2024, 2, 12), 200.0),
            ],
        );
        let monthly = normalize(&series, Cadence::Weekly, NormalizationRule::ForwardFillMean).unwrap();
        assert_eq!(monthly.first_month(), ymd(2024, 1, 1));
        // January: Jan 29-31 all hold 100.
        assert_relative_eq!(monthly.values()[0], 100.0);
        // February 1-12: 4 days at 100, 8 days at 200.
        assert_relative_eq!(monthly.values()[1], (4.0 * 100.0 + 8.0 * 200.0) / 12.0);
    }

    #[test]
    fn test_weekly_gap_is_forward_filled() {
        let series = raw(
            "inventory",
            Cadence::Weekly,
            &[(ymd(2024, 1, 1), 10.0), (ymd(2024, 3, 4), 20.0)],
        );
        let monthly = normalize(&series, Cadence::Weekly, NormalizationRule::ForwardFillMean).unwrap();
        assert_eq!(monthly.len(), 3);
        assert_relative_eq!(monthly.values()[1], 10.0);
    }

    #[test]
    fn test_quarterly_holds_knot_without_look_ahead() {
        let series = raw(
            "gdp",
            Cadence::Quarterly,
            &[(ymd(2023, 1, 1), 100.0), (ymd(2023, 4, 1), 130.0)],
        );
        let monthly = normalize(&series, Cadence::Quarterly, NormalizationRule::ForwardFill).unwrap();
        assert_eq!(monthly.first_month(), ymd(2023, 1, 1));
        assert_eq!(monthly.last_month(), ymd(2023, 6, 1));
        // February and March must not see the April knot.
        assert_eq!(monthly.values(), &[100.0, 100.0, 100.0, 130.0, 130.0, 130.0]);
    }

    #[test]
    fn test_annual_covers_twelve_months() {
        let series = raw("inflation", Cadence::Annual, &[(ymd(2020, 1, 1), 1.5)]);
        let monthly = normalize(&series, Cadence::Annual, NormalizationRule::ForwardFill).unwrap();
        assert_eq!(monthly.len(), 12);
        assert_eq!(monthly.last_month(), ymd(2020, 12, 1));
    }

    #[test]
    fn test_monthly_pass_through() {
        let series = raw(
            "rigs",
            Cadence::Monthly,
            &[(ymd(2024, 1, 1), 5.0), (ymd(2024, 2, 1), 6.0)],
        );
        let monthly = normalize(&series, Cadence::Monthly, NormalizationRule::PassThrough).unwrap();
        assert_eq!(monthly.values(), &[5.0, 6.0]);
    }

    #[test]
    fn test_monthly_pass_through_rejects_gap() {
        let series = raw(
            "rigs",
            Cadence::Monthly,
            &[(ymd(2024, 1, 1), 5.0), (ymd(2024, 3, 1), 6.0)],
        );
        assert!(matches!(
            normalize(&series, Cadence::Monthly, NormalizationRule::PassThrough),
            Err(Error::NonContiguous { .. })
        ));
    }

    #[test]
    fn test_rejects_nan_and_empty() {
        let nan = raw("x", Cadence::Daily, &[(ymd(2024, 1, 1), f64::NAN)]);
        assert!(matches!(
            normalize(&nan, Cadence::Daily, NormalizationRule::Mean),
            Err(Error::Schema(_))
        ));
        let empty = raw("x", Cadence::Daily, &[]);
        assert!(matches!(
            normalize(&empty, Cadence::Daily, NormalizationRule::Mean),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_timestamps() {
        let series = raw(
            "x",
            Cadence::Daily,
            &[(ymd(2024, 1, 1), 1.0), (ymd(2024, 1, 1), 2.0)],
        );
        assert!(matches!(
            normalize(&series, Cadence::Daily, NormalizationRule::Mean),
            Err(Error::DuplicateDate { .. })
        ));
    }

    #[test]
    fn test_normalize_all_renames_and_fails_fast() {
        let sources = vec![
            SourceConfig::new("currency", "eur_usd", Cadence::Daily),
            SourceConfig::new("rigs", "rigs", Cadence::Monthly),
        ];
        let raws = vec![
            raw("currency", Cadence::Daily, &[(ymd(2024, 1, 5), 1.1)]),
            raw("rigs", Cadence::Monthly, &[(ymd(2024, 1, 1), 500.0)]),
        ];
        let as_of = ymd(2024, 6, 30);
        let all = normalize_all(&sources, &raws, as_of).unwrap();
        assert_eq!(all.keys().cloned().collect::<Vec<_>>(), vec!["eur_usd", "rigs"]);
        assert_eq!(all["eur_usd"].name(), "eur_usd");

        let broken = vec![
            raw("currency", Cadence::Daily, &[(ymd(2024, 1, 5), 1.1), (ymd(2024, 3, 5), 1.2)]),
            raw("rigs", Cadence::Monthly, &[(ymd(2024, 1, 1), 500.0)]),
        ];
        assert!(matches!(normalize_all(&sources, &broken, as_of), Err(Error::Gap { .. })));

        assert!(matches!(
            normalize_all(&sources, &raws[..1], as_of),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn test_normalize_all_rejects_future_rows_per_series() {
        let sources = vec![
            SourceConfig::new("wti", "wti", Cadence::Daily),
            SourceConfig::new("rigs", "rigs", Cadence::Monthly),
        ];
        let raws = vec![
            raw("wti", Cadence::Daily, &[(ymd(2024, 1, 5), 70.0), (ymd(2024, 2, 20), 71.0)]),
            raw(
                "rigs",
                Cadence::Monthly,
                &[(ymd(2024, 1, 1), 500.0), (ymd(2024, 2, 1), 501.0), (ymd(2024, 3, 1), 502.0)],
            ),
        ];
        // Late February rows stay inside the as-of month.
        assert!(matches!(
            normalize_all(&sources, &raws, ymd(2024, 2, 10)),
            Err(Error::FutureDate { dates, .. }) if dates == vec![ymd(2024, 3, 1)]
        ));
        assert!(normalize_all(&sources, &raws, ymd(2024, 3, 1)).is_ok());
    }
}
