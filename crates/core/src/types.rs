//! Core data types for the panel pipeline.

use crate::error::{Error, Result};
use crate::validate;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Calendar month, represented by its first day.
pub type Month = NaiveDate;

/// Truncate a date to the first day of its month.
#[inline]
pub fn month_start(date: NaiveDate) -> Month {
    date - Duration::days(i64::from(date.day0()))
}

/// Months elapsed since year 0, January.
#[inline]
pub fn month_index(month: Month) -> i32 {
    month.year() * 12 + month.month0() as i32
}

/// Inverse of [`month_index`].
pub fn month_from_index(index: i32) -> Option<Month> {
    NaiveDate::from_ymd_opt(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1)
}

/// Shift a month by `n` calendar months (negative shifts go back).
pub fn add_months(month: Month, n: i32) -> Option<Month> {
    month_from_index(month_index(month) + n)
}

/// Number of calendar months from `from` to `to`.
#[inline]
pub fn months_between(from: Month, to: Month) -> i32 {
    month_index(to) - month_index(from)
}

/// Native sampling frequency of a raw series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
}

impl Cadence {
    /// Rule applied when a source does not override it.
    pub fn default_rule(self) -> NormalizationRule {
        match self {
            Cadence::Daily => NormalizationRule::Mean,
            Cadence::Weekly => NormalizationRule::ForwardFillMean,
            Cadence::Monthly => NormalizationRule::PassThrough,
            Cadence::Quarterly | Cadence::Annual => NormalizationRule::ForwardFill,
        }
    }

    /// Number of months one observation covers.
    pub fn months_covered(self) -> u32 {
        match self {
            Cadence::Daily | Cadence::Weekly | Cadence::Monthly => 1,
            Cadence::Quarterly => 3,
            Cadence::Annual => 12,
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
            Cadence::Quarterly => "quarterly",
            Cadence::Annual => "annual",
        };
        f.write_str(s)
    }
}

/// How a raw series is brought onto the monthly grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationRule {
    /// Arithmetic mean of all observations inside each calendar month.
    Mean,
    /// Forward-fill onto a daily grid, then monthly mean.
    ForwardFillMean,
    /// Hold each knot across its covered period and until the next knot.
    ForwardFill,
    /// Input is already monthly; validate and keep.
    PassThrough,
}

impl fmt::Display for NormalizationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NormalizationRule::Mean => "mean",
            NormalizationRule::ForwardFillMean => "forward_fill_mean",
            NormalizationRule::ForwardFill => "forward_fill",
            NormalizationRule::PassThrough => "pass_through",
        };
        f.write_str(s)
    }
}

/// A single dated observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

impl Observation {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Ordered observations of one metric at its native cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSeries {
    /// Source name (e.g., "wti").
    pub name: String,
    /// Declared native cadence.
    pub cadence: Cadence,
    /// Observations in date order.
    pub observations: Vec<Observation>,
}

impl RawSeries {
    /// Create a raw series.
    pub fn new(name: impl Into<String>, cadence: Cadence, observations: Vec<Observation>) -> Self {
        Self {
            name: name.into(),
            cadence,
            observations,
        }
    }

    /// Observation dates in stored order.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.observations.iter().map(|o| o.date).collect()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Contiguous month-indexed series with no missing values.
///
/// The only way to build one is through [`MonthlySeries::from_map`] or
/// [`MonthlySeries::from_values`], both of which enforce the calendar invariant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySeries {
    name: String,
    start: Month,
    end: Month,
    values: Vec<f64>,
}

impl MonthlySeries {
    /// Build from a month-keyed map.
    pub fn from_map(name: impl Into<String>, values: BTreeMap<Month, f64>) -> Result<Self> {
        let name = name.into();
        let months: Vec<Month> = values.keys().copied().collect();
        let start = *months
            .first()
            .ok_or_else(|| Error::insufficient_data(format!("series '{}' is empty", name)))?;

        validate::check_no_duplicates(&months)?;
        validate::check_monotonic_monthly(&months)?;

        let values: Vec<f64> = values.into_values().collect();
        Self::from_values(name, start, values)
    }

    /// Build from a start month and consecutive values.
    pub fn from_values(name: impl Into<String>, start: Month, values: Vec<f64>) -> Result<Self> {
        let name = name.into();
        if start != month_start(start) {
            return Err(Error::NotMonthStart(start));
        }
        if values.is_empty() {
            return Err(Error::insufficient_data(format!("series '{}' is empty", name)));
        }
        for (i, value) in values.iter().enumerate() {
            if !value.is_finite() {
                let month = add_months(start, i as i32)
                    .ok_or_else(|| Error::invariant("month out of calendar range"))?;
                return Err(Error::NullValue { column: name, month });
            }
        }
        let end = add_months(start, values.len() as i32 - 1)
            .ok_or_else(|| Error::invariant("month out of calendar range"))?;

        Ok(Self {
            name,
            start,
            end,
            values,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// First month with a value.
    pub fn first_month(&self) -> Month {
        self.start
    }

    /// Last month with a value.
    pub fn last_month(&self) -> Month {
        self.end
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value for a month, if inside the series span.
    pub fn get(&self, month: Month) -> Option<f64> {
        if month != month_start(month) {
            return None;
        }
        let offset = months_between(self.start, month);
        if offset < 0 {
            return None;
        }
        self.values.get(offset as usize).copied()
    }

    /// Values in month order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// (month, value) pairs in month order.
    pub fn iter(&self) -> impl Iterator<Item = (Month, f64)> + '_ {
        let start = month_index(self.start);
        self.values
            .iter()
            .enumerate()
            .filter_map(move |(i, v)| month_from_index(start + i as i32).map(|m| (m, *v)))
    }

    /// Same series under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

/// One named panel column. `None` marks a null cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Column with every cell present.
    pub fn dense(name: impl Into<String>, values: &[f64]) -> Self {
        Self::new(name, values.iter().map(|v| Some(*v)).collect())
    }
}

/// Borrowed view of one panel row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row<'a> {
    pub month: Month,
    pub values: BTreeMap<&'a str, Option<f64>>,
}

impl Row<'_> {
    /// Column names present in the row.
    pub fn column_names(&self) -> Vec<&str> {
        self.values.keys().copied().collect()
    }
}

/// Month-indexed table with a fixed, ordered column schema.
///
/// A panel is never mutated in place: every transformation returns a new one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Panel {
    months: Vec<Month>,
    columns: Vec<Column>,
    target: Option<String>,
}

impl Panel {
    /// Create a panel, checking structural consistency only.
    ///
    /// Calendar and null checks are the caller's responsibility (see
    /// [`crate::validate::validate_panel`]).
    pub fn new(months: Vec<Month>, columns: Vec<Column>, target: Option<String>) -> Result<Self> {
        let mut seen = std::collections::BTreeSet::new();
        for column in &columns {
            if column.values.len() != months.len() {
                return Err(Error::invariant(format!(
                    "column '{}' has {} rows, panel has {}",
                    column.name,
                    column.values.len(),
                    months.len()
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(Error::schema(format!("duplicate column '{}'", column.name)));
            }
        }
        if let Some(target) = &target {
            if !seen.contains(target.as_str()) {
                return Err(Error::schema(format!("target column '{}' not in panel", target)));
            }
        }
        Ok(Self {
            months,
            columns,
            target,
        })
    }

    pub fn months(&self) -> &[Month] {
        &self.months
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Prediction target column, if one is designated.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn len(&self) -> usize {
        self.months.len()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    pub fn first_month(&self) -> Option<Month> {
        self.months.first().copied()
    }

    pub fn last_month(&self) -> Option<Month> {
        self.months.last().copied()
    }

    /// Row view at position `i`.
    pub fn row(&self, i: usize) -> Option<Row<'_>> {
        let month = *self.months.get(i)?;
        let values = self
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.values[i]))
            .collect();
        Some(Row { month, values })
    }

    /// New panel without the named columns.
    pub fn without_columns(&self, names: &[String]) -> Result<Panel> {
        for name in names {
            if self.column(name).is_none() {
                return Err(Error::schema(format!("cannot drop missing column '{}'", name)));
            }
            if self.target.as_deref() == Some(name.as_str()) {
                return Err(Error::schema(format!("cannot drop target column '{}'", name)));
            }
        }
        let columns = self
            .columns
            .iter()
            .filter(|c| !names.contains(&c.name))
            .cloned()
            .collect();
        Panel::new(self.months.clone(), columns, self.target.clone())
    }

    /// New panel with an extra column appended.
    pub fn with_column(&self, column: Column) -> Result<Panel> {
        let mut columns = self.columns.clone();
        columns.push(column);
        Panel::new(self.months.clone(), columns, self.target.clone())
    }

    /// New panel without the first `n` rows.
    pub fn skip_rows(&self, n: usize) -> Panel {
        let n = n.min(self.months.len());
        Panel {
            months: self.months[n..].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.values[n..].to_vec()))
                .collect(),
            target: self.target.clone(),
        }
    }

    /// New panel with the target column moved to the end.
    pub fn with_target_last(&self) -> Panel {
        let mut columns = self.columns.clone();
        if let Some(target) = &self.target {
            if let Some(pos) = columns.iter().position(|c| &c.name == target) {
                let column = columns.remove(pos);
                columns.push(column);
            }
        }
        Panel {
            months: self.months.clone(),
            columns,
            target: self.target.clone(),
        }
    }
}

/// Dense panel ready for model training.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TrainingReadyPanel {
    panel: Panel,
}

impl TrainingReadyPanel {
    /// Wrap a panel after checking it is dense, contiguous and has a target.
    pub fn new(panel: Panel) -> Result<Self> {
        if panel.target().is_none() {
            return Err(Error::schema("training panel requires a target column"));
        }
        if panel.is_empty() {
            return Err(Error::insufficient_data("training panel has no rows"));
        }
        validate::check_no_duplicates(panel.months())?;
        validate::check_monotonic_monthly(panel.months())?;
        validate::check_no_nulls(&panel)?;
        Ok(Self { panel })
    }

    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    pub fn len(&self) -> usize {
        self.panel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panel.is_empty()
    }

    pub fn months(&self) -> &[Month] {
        self.panel.months()
    }

    /// Name of the target column.
    pub fn target(&self) -> &str {
        self.panel.target().unwrap_or_default()
    }

    /// Every column except the target, in panel order.
    pub fn feature_columns(&self) -> Vec<&str> {
        let target = self.target();
        self.panel
            .column_names()
            .into_iter()
            .filter(|c| *c != target)
            .collect()
    }

    /// Dense values of a column.
    pub fn values(&self, name: &str) -> Option<Vec<f64>> {
        self.panel
            .column(name)
            .map(|c| c.values.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }

    /// Dense target values.
    pub fn target_values(&self) -> Vec<f64> {
        self.values(self.target()).unwrap_or_default()
    }

    /// Feature vector of row `i`, in [`Self::feature_columns`] order.
    pub fn feature_row(&self, i: usize) -> Option<Vec<f64>> {
        if i >= self.len() {
            return None;
        }
        self.feature_columns()
            .into_iter()
            .map(|name| self.panel.column(name).and_then(|c| c.values[i]))
            .collect()
    }
}

/// Operation producing a derived feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FeatureOp {
    /// Mean of the source over the trailing `window` months, current included.
    RollingMean { window: usize },
    /// Source value `periods` months earlier.
    Lag { periods: usize },
}

impl FeatureOp {
    /// Leading rows left null by this operation.
    pub fn warmup_rows(self) -> usize {
        match self {
            FeatureOp::RollingMean { window } => window.saturating_sub(1),
            FeatureOp::Lag { periods } => periods,
        }
    }
}

impl fmt::Display for FeatureOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureOp::RollingMean { window } => write!(f, "rolling_mean({})", window),
            FeatureOp::Lag { periods } => write!(f, "lag({})", periods),
        }
    }
}

/// Declarative description of one derived feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Resulting column name.
    pub name: String,
    /// Column the operation reads.
    pub source: String,
    #[serde(flatten)]
    pub op: FeatureOp,
}

impl FeatureSpec {
    pub fn rolling_mean(name: impl Into<String>, source: impl Into<String>, window: usize) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            op: FeatureOp::RollingMean { window },
        }
    }

    pub fn lag(name: impl Into<String>, source: impl Into<String>, periods: usize) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            op: FeatureOp::Lag { periods },
        }
    }

    /// Leading rows this spec alone leaves null.
    pub fn warmup_rows(&self) -> usize {
        self.op.warmup_rows()
    }
}

/// One dated forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub forecast_date: Month,
    pub predicted_value: f64,
    pub interval_lower: f64,
    pub interval_upper: f64,
    /// Confidence in [0, 1].
    pub confidence: f64,
}

impl ForecastRecord {
    /// Width of the prediction interval.
    #[inline]
    pub fn interval_width(&self) -> f64 {
        self.interval_upper - self.interval_lower
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_start() {
        assert_eq!(month_start(ymd(2024, 2, 29)), ymd(2024, 2, 1));
        assert_eq!(month_start(ymd(2024, 3, 1)), ymd(2024, 3, 1));
    }

    #[test]
    fn test_add_months_crosses_year() {
        assert_eq!(add_months(ymd(2023, 11, 1), 3), Some(ymd(2024, 2, 1)));
        assert_eq!(add_months(ymd(2024, 1, 1), -1), Some(ymd(2023, 12, 1)));
        assert_eq!(months_between(ymd(2005, 3, 1), ymd(2006, 1, 1)), 10);
    }

    #[test]
    fn test_monthly_series_rejects_gap() {
        let mut map = BTreeMap::new();
        map.insert(ymd(2020, 1, 1), 1.0);
        map.insert(ymd(2020, 3, 1), 3.0);
        let err = MonthlySeries::from_map("x", map).unwrap_err();
        assert!(matches!(err, Error::NonContiguous { .. }));
    }

    #[test]
    fn test_monthly_series_rejects_nan() {
        let err = MonthlySeries::from_values("x", ymd(2020, 1, 1), vec![1.0, f64::NAN]).unwrap_err();
        assert!(matches!(err, Error::NullValue { month, .. } if month == ymd(2020, 2, 1)));
    }

    #[test]
    fn test_monthly_series_lookup() {
        let s = MonthlySeries::from_values("x", ymd(2020, 11, 1), vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(s.last_month(), ymd(2021, 1, 1));
        assert_eq!(s.get(ymd(2021, 1, 1)), Some(3.0));
        assert_eq!(s.get(ymd(2020, 10, 1)), None);
        assert_eq!(s.get(ymd(2021, 2, 1)), None);
        let months: Vec<Month> = s.iter().map(|(m, _)| m).collect();
        assert_eq!(months, vec![ymd(2020, 11, 1), ymd(2020, 12, 1), ymd(2021, 1, 1)]);
    }

    #[test]
    fn test_panel_transformations_return_new_panels() {
        let months = vec![ymd(2020, 1, 1), ymd(2020, 2, 1), ymd(2020, 3, 1)];
        let panel = Panel::new(
            months,
            vec![
                Column::dense("wti", &[1.0, 2.0, 3.0]),
                Column::dense("gdp", &[4.0, 5.0, 6.0]),
            ],
            Some("wti".to_string()),
        )
        .unwrap();

        let reordered = panel.with_target_last();
        assert_eq!(reordered.column_names(), vec!["gdp", "wti"]);
        assert_eq!(panel.column_names(), vec!["wti", "gdp"]);

        let trimmed = reordered.skip_rows(1);
        assert_eq!(trimmed.first_month(), Some(ymd(2020, 2, 1)));
        assert_eq!(trimmed.column("wti").unwrap().values, vec![Some(2.0), Some(3.0)]);

        let dropped = panel.without_columns(&["gdp".to_string()]).unwrap();
        assert_eq!(dropped.column_names(), vec!["wti"]);
        assert!(panel.without_columns(&["wti".to_string()]).is_err());
    }

    #[test]
    fn test_panel_rejects_ragged_columns() {
        let err = Panel::new(
            vec![ymd(2020, 1, 1)],
            vec![Column::dense("a", &[1.0, 2.0])],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }

    #[test]
    fn test_training_panel_feature_row() {
        let panel = Panel::new(
            vec![ymd(2020, 1, 1), ymd(2020, 2, 1)],
            vec![
                Column::dense("eur_usd", &[1.1, 1.2]),
                Column::dense("wti", &[50.0, 55.0]),
            ],
            Some("wti".to_string()),
        )
        .unwrap();
        let training = TrainingReadyPanel::new(panel).unwrap();
        assert_eq!(training.feature_columns(), vec!["eur_usd"]);
        assert_eq!(training.feature_row(1), Some(vec![1.2]));
        assert_eq!(training.target_values(), vec![50.0, 55.0]);
    }

    #[test]
    fn test_training_panel_rejects_nulls() {
        let panel = Panel::new(
            vec![ymd(2020, 1, 1), ymd(2020, 2, 1)],
            vec![Column::new("wti", vec![None, Some(1.0)])],
            Some("wti".to_string()),
        )
        .unwrap();
        assert!(matches!(
            TrainingReadyPanel::new(panel),
            Err(Error::NullValue { .. })
        ));
    }

    #[test]
    fn test_feature_spec_json_shape() {
        let spec: FeatureSpec =
            serde_json::from_str(r#"{"name":"wti_6m_lag","source":"wti","op":"lag","periods":6}"#)
                .unwrap();
        assert_eq!(spec, FeatureSpec::lag("wti_6m_lag", "wti", 6));
        assert_eq!(spec.warmup_rows(), 6);
        assert_eq!(FeatureOp::RollingMean { window: 3 }.warmup_rows(), 2);
        assert_eq!(spec.op.to_string(), "lag(6)");
    }
}
