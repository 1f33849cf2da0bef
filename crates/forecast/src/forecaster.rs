//! Recursive multi-step forecaster.
//!
//! The feature vector used to predict month `t` is the one observed at
//! month `t - 1`. After each step the prediction is appended to the target
//! history and every derived feature is recomputed from that history, so
//! later steps read earlier predictions. Exogenous columns hold their last
//! observed value.

use crate::confidence::ConfidenceSchedule;
use crate::estimator::Estimator;
use mfpanel_core::{
    add_months, Column, Error, FeatureSpec, ForecastConfig, ForecastRecord, Month, Panel, Result,
    TrainingReadyPanel,
};
use mfpanel_features::{derive_columns, effective_warmup};
use tracing::{debug, info};

/// Accumulates base-column history and evaluates feature vectors from it.
#[derive(Debug, Clone)]
pub struct FeatureRowGenerator {
    months: Vec<Month>,
    /// Base (non-derived) columns, target included.
    columns: Vec<Column>,
    target: String,
    specs: Vec<FeatureSpec>,
    feature_columns: Vec<String>,
    /// Months appended from predictions.
    predicted: usize,
}

impl FeatureRowGenerator {
    /// Build from any panel holding the base columns.
    ///
    /// Columns named by a spec are ignored and recomputed. Feature order
    /// matches the training panel layout: base columns in panel order, then
    /// derived columns in spec order.
    pub fn new(history: &Panel, specs: &[FeatureSpec]) -> Result<Self> {
        let target = history
            .target()
            .ok_or_else(|| Error::schema("forecast history requires a target column"))?
            .to_string();
        if history.is_empty() {
            return Err(Error::insufficient_data("forecast history has no rows"));
        }

        let columns: Vec<Column> = history
            .columns()
            .iter()
            .filter(|c| !specs.iter().any(|s| s.name == c.name))
            .cloned()
            .collect();
        let base: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        effective_warmup(specs, &base)?;

        let feature_columns = base
            .iter()
            .filter(|c| **c != target)
            .map(|c| c.to_string())
            .chain(specs.iter().map(|s| s.name.clone()))
            .collect();

        Ok(Self {
            months: history.months().to_vec(),
            columns,
            target,
            specs: specs.to_vec(),
            feature_columns,
            predicted: 0,
        })
    }

    /// Build from a training panel, recomputing derived columns from its
    /// own rows.
    pub fn from_training(training: &TrainingReadyPanel, specs: &[FeatureSpec]) -> Result<Self> {
        let generator = Self::new(training.panel(), specs)?;
        if generator.feature_columns() != training.feature_columns() {
            return Err(Error::invariant(format!(
                "generator features [{}] do not match training features [{}]",
                generator.feature_columns.join(", "),
                training.feature_columns().join(", ")
            )));
        }
        Ok(generator)
    }

    pub fn feature_columns(&self) -> Vec<&str> {
        self.feature_columns.iter().map(String::as_str).collect()
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Latest month in the history, observed or predicted.
    pub fn last_month(&self) -> Option<Month> {
        self.months.last().copied()
    }

    /// Number of predicted months appended so far.
    pub fn predicted(&self) -> usize {
        self.predicted
    }

    /// Feature vector at the latest month.
    pub fn current_row(&self) -> Result<Vec<f64>> {
        let month = self
            .last_month()
            .ok_or_else(|| Error::insufficient_data("forecast history has no rows"))?;
        let panel = Panel::new(
            self.months.clone(),
            self.columns.clone(),
            Some(self.target.clone()),
        )?;
        let derived = derive_columns(&panel, &self.specs)?;
        let last = derived.len() - 1;

        self.feature_columns
            .iter()
            .map(|name| {
                derived
                    .column(name)
                    .and_then(|c| c.values[last])
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| Error::feature_gap(name, month))
            })
            .collect()
    }

    /// Append a predicted target value for the next month.
    pub fn advance(&mut self, prediction: f64) -> Result<Month> {
        let last = self
            .last_month()
            .ok_or_else(|| Error::insufficient_data("forecast history has no rows"))?;
        let next = add_months(last, 1).ok_or_else(|| Error::invariant("month out of calendar range"))?;

        for column in &mut self.columns {
            let value = if column.name == self.target {
                Some(prediction)
            } else {
                column.values.last().copied().flatten()
            };
            column.values.push(value);
        }
        self.months.push(next);
        self.predicted += 1;
        Ok(next)
    }
}

/// Multi-step forecaster.
#[derive(Debug, Clone)]
pub struct Forecaster {
    horizon: usize,
    schedule: ConfidenceSchedule,
}

impl Forecaster {
    pub fn new(horizon: usize, schedule: ConfidenceSchedule) -> Result<Self> {
        if horizon == 0 {
            return Err(Error::config("forecast horizon must be at least 1"));
        }
        Ok(Self { horizon, schedule })
    }

    /// Build from configuration and the training target history.
    pub fn from_config(config: &ForecastConfig, target: &[f64]) -> Result<Self> {
        Self::new(config.horizon, ConfidenceSchedule::from_config(config, target)?)
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn schedule(&self) -> &ConfidenceSchedule {
        &self.schedule
    }

    /// Forecast `horizon` months past the end of `generator`'s history.
    ///
    /// All-or-nothing: any failing step discards the whole sequence.
    pub fn forecast(
        &self,
        model: Option<&dyn Estimator>,
        generator: &FeatureRowGenerator,
    ) -> Result<Vec<ForecastRecord>> {
        let model = model.ok_or_else(|| Error::model_unavailable("no trained estimator supplied"))?;
        let mut state = generator.clone();
        let mut records = Vec::with_capacity(self.horizon);

        for step in 1..=self.horizon {
            let features = state.current_row()?;
            let predicted_value = model.predict(&features)?;
            if !predicted_value.is_finite() {
                return Err(Error::invariant(format!(
                    "estimator '{}' returned {} at step {}",
                    model.name(),
                    predicted_value,
                    step
                )));
            }

            let forecast_date = state.advance(predicted_value)?;
            let confidence = self.schedule.confidence(step);
            let half_width = self.schedule.half_width(step);

            debug!(step, features = ?features, "forecast inputs");
            info!(
                step,
                month = %forecast_date,
                prediction = predicted_value,
                confidence,
                "forecast step"
            );

            records.push(ForecastRecord {
                forecast_date,
                predicted_value,
                interval_lower: predicted_value - half_width,
                interval_upper: predicted_value + half_width,
                confidence,
            });
        }

        Ok(records)
    }
}
