//! Holdout evaluation metrics.
//!
//! Scores an estimator on the trailing rows of a training panel, split
//! chronologically.

use crate::estimator::Estimator;
use mfpanel_core::{Error, Result, TrainingReadyPanel};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Out-of-sample accuracy of an estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Mean absolute percentage error (percent), over non-zero actuals.
    pub mape: Option<f64>,
    /// Share of successive moves whose direction was predicted (percent).
    pub directional_accuracy: Option<f64>,
    /// Number of holdout rows.
    pub samples: usize,
}

impl ForecastMetrics {
    /// Compute metrics from paired actual and predicted values.
    pub fn from_pairs(actual: &[f64], predicted: &[f64]) -> Result<Self> {
        if actual.len() != predicted.len() {
            return Err(Error::invariant(format!(
                "{} actuals but {} predictions",
                actual.len(),
                predicted.len()
            )));
        }
        if actual.is_empty() {
            return Err(Error::insufficient_data("no holdout rows to score"));
        }

        let n = actual.len() as f64;
        let errors: Vec<f64> = actual.iter().zip(predicted).map(|(a, p)| a - p).collect();

        let rmse = (errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt();
        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

        let ratios: Vec<f64> = actual
            .iter()
            .zip(&errors)
            .filter(|(a, _)| **a != 0.0)
            .map(|(a, e)| (e / a).abs())
            .collect();
        let mape = if ratios.is_empty() {
            None
        } else {
            Some(ratios.iter().sum::<f64>() / ratios.len() as f64 * 100.0)
        };

        let directional_accuracy = if actual.len() < 2 {
            None
        } else {
            let hits = actual
                .windows(2)
                .zip(predicted.windows(2))
                .filter(|(a, p)| sign(a[1] - a[0]) == sign(p[1] - p[0]))
                .count();
            Some(hits as f64 / (actual.len() - 1) as f64 * 100.0)
        };

        Ok(Self {
            rmse,
            mae,
            mape,
            directional_accuracy,
            samples: actual.len(),
        })
    }
}

fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

/// Score `estimator` on the trailing `holdout_fraction` of `training`.
///
/// The split point is `floor(len * (1 - holdout_fraction))`; at least one
/// row is kept on each side.
pub fn evaluate_holdout(
    training: &TrainingReadyPanel,
    estimator: &dyn Estimator,
    holdout_fraction: f64,
) -> Result<ForecastMetrics> {
    if !(holdout_fraction > 0.0 && holdout_fraction < 1.0) {
        return Err(Error::config("holdout_fraction must be in (0, 1)"));
    }
    let len = training.len();
    if len < 2 {
        return Err(Error::insufficient_data(format!(
            "{} rows cannot be split for holdout",
            len
        )));
    }

    let split = ((len as f64 * (1.0 - holdout_fraction)).floor() as usize).clamp(1, len - 1);
    let target = training.target_values();

    let mut actual = Vec::with_capacity(len - split);
    let mut predicted = Vec::with_capacity(len - split);
    for i in split..len {
        let row = training
            .feature_row(i)
            .ok_or_else(|| Error::invariant(format!("missing feature row {}", i)))?;
        predicted.push(estimator.predict(&row)?);
        actual.push(target[i]);
    }

    let metrics = ForecastMetrics::from_pairs(&actual, &predicted)?;
    info!(
        model = estimator.name(),
        samples = metrics.samples,
        rmse = metrics.rmse,
        mae = metrics.mae,
        "holdout evaluation"
    );
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::LinearModel;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use mfpanel_core::{add_months, Column, Panel};

    fn training(feature: &[f64], target: &[f64]) -> TrainingReadyPanel {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let months = (0..target.len())
            .map(|i| add_months(start, i as i32).unwrap())
            .collect();
        let panel = Panel::new(
            months,
            vec![Column::dense("x", feature), Column::dense("wti", target)],
            Some("wti".to_string()),
        )
        .unwrap();
        TrainingReadyPanel::new(panel).unwrap()
    }

    #[test]
    fn test_basic_metrics() {
        let metrics = ForecastMetrics::from_pairs(&[10.0, 20.0, 15.0], &[12.0, 18.0, 15.0]).unwrap();
        assert_relative_eq!(metrics.rmse, (8.0f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(metrics.mae, 4.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(metrics.mape.unwrap(), (0.2 + 0.1) / 3.0 * 100.0, epsilon = 1e-9);
        // Up/down matched both times.
        assert_relative_eq!(metrics.directional_accuracy.unwrap(), 100.0);
        assert_eq!(metrics.samples, 3);
    }

    #[test]
    fn test_mape_skips_zero_actuals() {
        let metrics = ForecastMetrics::from_pairs(&[0.0, 10.0], &[1.0, 11.0]).unwrap();
        assert_relative_eq!(metrics.mape.unwrap(), 10.0, epsilon = 1e-9);

        let all_zero = ForecastMetrics::from_pairs(&[0.0], &[1.0]).unwrap();
        assert!(all_zero.mape.is_none());
        assert!(all_zero.directional_accuracy.is_none());
    }

    #[test]
    fn test_directional_miss() {
        let metrics = ForecastMetrics::from_pairs(&[1.0, 2.0, 1.0], &[1.0, 0.5, 2.0]).unwrap();
        assert_relative_eq!(metrics.directional_accuracy.unwrap(), 0.0);
    }

    #[test]
    fn test_holdout_split_is_chronological() {
        let x: Vec<f64> = (0..10).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        let panel = training(&x, &y);

        let perfect = LinearModel::new(1.0, vec![2.0]);
        let metrics = evaluate_holdout(&panel, &perfect, 0.2).unwrap();
        assert_eq!(metrics.samples, 2);
        assert_relative_eq!(metrics.rmse, 0.0);

        let biased = LinearModel::new(2.0, vec![2.0]);
        let metrics = evaluate_holdout(&panel, &biased, 0.2).unwrap();
        assert_relative_eq!(metrics.mae, 1.0);
    }

    #[test]
    fn test_holdout_needs_two_rows() {
        let panel = training(&[1.0], &[2.0]);
        let model = LinearModel::new(0.0, vec![1.0]);
        assert!(matches!(
            evaluate_holdout(&panel, &model, 0.2),
            Err(Error::InsufficientData(_))
        ));
    }
}
