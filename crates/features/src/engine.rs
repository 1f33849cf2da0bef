//! Feature derivation engine.
//!
//! Turns a merged [`Panel`] into a [`TrainingReadyPanel`]: drops the
//! configured low-value columns, appends derived columns in declared order,
//! trims the warm-up rows and checks the result is fully dense.

use crate::rolling::apply_op;
use mfpanel_core::{
    validate, Column, Error, FeatureConfig, FeatureOp, FeatureSpec, Panel, Result,
    TrainingReadyPanel,
};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Feature engine bound to one feature configuration.
#[derive(Debug, Clone)]
pub struct FeatureEngine {
    config: FeatureConfig,
}

impl FeatureEngine {
    /// Create a new feature engine from configuration.
    pub fn new(config: &FeatureConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Feature specs in application order.
    pub fn specs(&self) -> &[FeatureSpec] {
        &self.config.specs
    }

    /// Configured number of leading rows to trim.
    pub fn warmup_rows(&self) -> usize {
        self.config.warmup_rows
    }

    /// Derive the training-ready panel.
    pub fn derive(&self, panel: &Panel) -> Result<TrainingReadyPanel> {
        derive(
            panel,
            &self.config.drop_columns,
            &self.config.specs,
            self.config.warmup_rows,
            &self.config.non_negative_columns,
        )
    }
}

/// Leading null rows of every column a spec list can reach.
///
/// Base columns need no warm-up. A spec reading an earlier derived column
/// inherits that column's warm-up on top of its own.
pub fn effective_warmup<S: AsRef<str>>(
    specs: &[FeatureSpec],
    base_columns: &[S],
) -> Result<BTreeMap<String, usize>> {
    let mut warmup: BTreeMap<String, usize> = base_columns
        .iter()
        .map(|c| (c.as_ref().to_string(), 0))
        .collect();

    for spec in specs {
        match spec.op {
            FeatureOp::RollingMean { window: 0 } => {
                return Err(Error::config(format!("'{}': window must be positive", spec.name)));
            }
            FeatureOp::Lag { periods: 0 } => {
                return Err(Error::config(format!("'{}': lag must be positive", spec.name)));
            }
            _ => {}
        }
        let inherited = *warmup.get(&spec.source).ok_or_else(|| {
            Error::schema(format!(
                "feature '{}' reads unknown column '{}'",
                spec.name, spec.source
            ))
        })?;
        if warmup.contains_key(&spec.name) {
            return Err(Error::schema(format!(
                "feature '{}' would overwrite an existing column",
                spec.name
            )));
        }
        warmup.insert(spec.name.clone(), inherited + spec.warmup_rows());
    }

    Ok(warmup)
}

/// Append every derived column without trimming.
pub fn derive_columns(panel: &Panel, specs: &[FeatureSpec]) -> Result<Panel> {
    let mut out = panel.clone();
    for spec in specs {
        let source = out.column(&spec.source).ok_or_else(|| {
            Error::schema(format!(
                "feature '{}' reads unknown column '{}'",
                spec.name, spec.source
            ))
        })?;
        let values = apply_op(spec.op, &source.values);
        debug!(feature = %spec.name, source = %spec.source, op = %spec.op, "derived feature");
        out = out.with_column(Column::new(spec.name.clone(), values))?;
    }
    Ok(out)
}

/// Derive a training-ready panel.
///
/// Fails with `Config` when `warmup_rows` is smaller than the longest
/// effective warm-up of `specs`, and with `Invariant` if a null survives
/// the trim.
pub fn derive(
    panel: &Panel,
    drop_columns: &[String],
    specs: &[FeatureSpec],
    warmup_rows: usize,
    non_negative_columns: &[String],
) -> Result<TrainingReadyPanel> {
    let target = panel
        .target()
        .ok_or_else(|| Error::schema("feature derivation requires a target column"))?
        .to_string();

    let reduced = panel.without_columns(drop_columns)?;
    if !drop_columns.is_empty() {
        info!(columns = ?drop_columns, "dropped columns");
    }

    let base = reduced.column_names();
    let warmup = effective_warmup(specs, &base)?;
    let required = warmup.values().copied().max().unwrap_or(0);
    if warmup_rows < required {
        return Err(Error::config(format!(
            "warmup_rows is {} but the feature specs need at least {}",
            warmup_rows, required
        )));
    }

    let derived = derive_columns(&reduced, specs)?;
    if warmup_rows >= derived.len() {
        return Err(Error::insufficient_data(format!(
            "{} rows cannot cover a warm-up of {}",
            derived.len(),
            warmup_rows
        )));
    }

    let trimmed = derived.skip_rows(warmup_rows).with_target_last();
    info!(
        trimmed = warmup_rows,
        rows = trimmed.len(),
        first = ?trimmed.first_month(),
        target = %target,
        "trimmed warm-up rows"
    );

    validate::check_non_negative(&trimmed, non_negative_columns)?;

    TrainingReadyPanel::new(trimmed).map_err(|e| match e {
        Error::NullValue { column, month } => Error::invariant(format!(
            "column '{}' is still null at {} after trimming",
            column, month
        )),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use mfpanel_core::{add_months, Month};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn months(start: Month, n: usize) -> Vec<Month> {
        (0..n).map(|i| add_months(start, i as i32).unwrap()).collect()
    }

    fn panel(columns: Vec<Column>) -> Panel {
        let n = columns[0].values.len();
        Panel::new(months(ymd(2005, 1, 1), n), columns, Some("wti".to_string())).unwrap()
    }

    fn wti_panel(values: &[f64]) -> Panel {
        panel(vec![Column::dense("wti", values)])
    }

    #[test]
    fn test_zero_width_specs_rejected() {
        let p = wti_panel(&[10.0, 20.0, 30.0, 40.0]);
        for spec in [
            FeatureSpec::rolling_mean("wti_0m", "wti", 0),
            FeatureSpec::lag("wti_lag0", "wti", 0),
        ] {
            assert!(matches!(
                derive(&p, &[], &[spec], 1, &[]),
                Err(Error::Config(_))
            ));
        }
    }

    #[test]
    fn test_rolling_mean_trim() {
        let p = wti_panel(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0]);
        let specs = vec![FeatureSpec::rolling_mean("wti_3m", "wti", 3)];
        let out = derive(&p, &[], &specs, 2, &[]).unwrap();

        assert_eq!(out.len(), 4);
        assert_eq!(out.months()[0], ymd(2005, 3, 1));
        assert_eq!(out.values("wti_3m").unwrap(), vec![20.0, 30.0, 40.0, 50.0]);
        assert_eq!(out.panel().column_names(), vec!["wti_3m", "wti"]);
    }

    #[test]
    fn test_lag_feature() {
        let p = wti_panel(&[10.0, 20.0, 30.0, 40.0]);
        let specs = vec![FeatureSpec::lag("wti_lag2", "wti", 2)];
        let out = derive(&p, &[], &specs, 2, &[]).unwrap();
        assert_eq!(out.values("wti_lag2").unwrap(), vec![10.0, 20.0]);
        assert_eq!(out.target_values(), vec![30.0, 40.0]);
    }

    #[test]
    fn test_starts_at_anchor_plus_warmup() {
        let values: Vec<f64> = (1..=24).map(f64::from).collect();
        let p = wti_panel(&values);
        let engine = FeatureEngine::new(&FeatureConfig {
            drop_columns: vec![],
            specs: vec![
                FeatureSpec::rolling_mean("wti_6m_rolling", "wti", 6),
                FeatureSpec::rolling_mean("wti_12m_rolling", "wti", 12),
                FeatureSpec::lag("wti_6m_lag", "wti", 6),
            ],
            warmup_rows: 12,
            non_negative_columns: vec!["wti_6m_rolling".to_string()],
        });
        let out = engine.derive(&p).unwrap();
        assert_eq!(out.months()[0], ymd(2006, 1, 1));
        assert_eq!(out.len(), 12);
        // Month 13: lag 6 reads month 7.
        assert_eq!(out.values("wti_6m_lag").unwrap()[0], 7.0);
        assert_relative_eq!(out.values("wti_12m_rolling").unwrap()[0], 7.5);
    }

    #[test]
    fn test_drop_columns_first() {
        let p = panel(vec![
            Column::dense("gdp", &[1.0, 2.0, 3.0]),
            Column::dense("rigs", &[4.0, 5.0, 6.0]),
            Column::dense("wti", &[7.0, 8.0, 9.0]),
        ]);
        let out = derive(&p, &["gdp".to_string()], &[], 0, &[]).unwrap();
        assert_eq!(out.panel().column_names(), vec!["rigs", "wti"]);
        assert_eq!(out.feature_columns(), vec!["rigs"]);
    }

    #[test]
    fn test_chained_specs_accumulate_warmup() {
        let specs = vec![
            FeatureSpec::rolling_mean("wti_3m", "wti", 3),
            FeatureSpec::lag("wti_3m_lag2", "wti_3m", 2),
        ];
        let warmup = effective_warmup(&specs, &["wti"]).unwrap();
        assert_eq!(warmup["wti_3m"], 2);
        assert_eq!(warmup["wti_3m_lag2"], 4);

        let p = wti_panel(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(matches!(derive(&p, &[], &specs, 3, &[]), Err(Error::Config(_))));

        let out = derive(&p, &[], &specs, 4, &[]).unwrap();
        assert_eq!(out.values("wti_3m_lag2").unwrap(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_insufficient_warmup_is_config_error() {
        let p = wti_panel(&[1.0, 2.0, 3.0, 4.0]);
        let specs = vec![FeatureSpec::lag("wti_lag3", "wti", 3)];
        assert!(matches!(derive(&p, &[], &specs, 2, &[]), Err(Error::Config(_))));
    }

    #[test]
    fn test_warmup_longer_than_panel() {
        let p = wti_panel(&[1.0, 2.0]);
        let specs = vec![FeatureSpec::lag("wti_lag2", "wti", 2)];
        assert!(matches!(
            derive(&p, &[], &specs, 2, &[]),
            Err(Error::InsufficientData(_))
        ));
    }

    #[test]
    fn test_unknown_source_column() {
        let p = wti_panel(&[1.0, 2.0, 3.0]);
        let specs = vec![FeatureSpec::lag("brent_lag", "brent", 1)];
        assert!(matches!(derive(&p, &[], &specs, 1, &[]), Err(Error::Schema(_))));
    }

    #[test]
    fn test_null_in_base_column_is_invariant() {
        let p = panel(vec![
            Column::new("rigs", vec![Some(1.0), Some(2.0), None]),
            Column::dense("wti", &[1.0, 2.0, 3.0]),
        ]);
        assert!(matches!(derive(&p, &[], &[], 0, &[]), Err(Error::Invariant(_))));
    }

    #[test]
    fn test_negative_value_out_of_range() {
        let p = wti_panel(&[-5.0, -3.0, 1.0]);
        let specs = vec![FeatureSpec::rolling_mean("wti_2m", "wti", 2)];
        let result = derive(&p, &[], &specs, 1, &["wti_2m".to_string()]);
        assert!(matches!(result, Err(Error::OutOfRange { ref column, .. }) if column == "wti_2m"));
    }

    #[test]
    fn test_derive_is_idempotent() {
        let p = wti_panel(&[3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0]);
        let specs = vec![
            FeatureSpec::rolling_mean("wti_3m", "wti", 3),
            FeatureSpec::lag("wti_lag1", "wti", 1),
        ];
        let a = derive(&p, &[], &specs, 2, &[]).unwrap();
        let b = derive(&p, &[], &specs, 2, &[]).unwrap();
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    #[test]
    fn test_input_panel_untouched() {
        let p = wti_panel(&[1.0, 2.0, 3.0]);
        let specs = vec![FeatureSpec::lag("wti_lag1", "wti", 1)];
        derive(&p, &[], &specs, 1, &[]).unwrap();
        assert_eq!(p.column_names(), vec!["wti"]);
        assert_eq!(p.len(), 3);
    }
}
