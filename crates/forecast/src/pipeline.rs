//! End-to-end pipeline: normalize, merge, derive, forecast.
//!
//! A run is all-or-nothing. Any stage error is returned as-is and no
//! partial panel or forecast escapes.

use crate::estimator::Estimator;
use crate::forecaster::{FeatureRowGenerator, Forecaster};
use crate::metrics::{evaluate_holdout, ForecastMetrics};
use chrono::NaiveDate;
use mfpanel_core::{
    Config, Error, ForecastRecord, Month, Panel, RawSeries, Result, TrainingReadyPanel,
};
use mfpanel_features::FeatureEngine;
use mfpanel_ingestion::{normalize_all, PanelMerger};
use serde::Serialize;
use tracing::info;

/// Outputs of the data stages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedData {
    /// Merged and validated panel.
    pub panel: Panel,
    /// Panel after column drop, feature derivation and warm-up trim.
    pub training: TrainingReadyPanel,
}

/// Latest actual plus the forecast path, as handed to notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReport {
    pub model: String,
    pub current_month: Month,
    pub current_value: f64,
    pub records: Vec<ForecastRecord>,
}

/// Everything a full run produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutput {
    pub panel: Panel,
    pub training: TrainingReadyPanel,
    pub report: ForecastReport,
}

/// Configured pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Config,
    merger: PanelMerger,
    engine: FeatureEngine,
}

impl Pipeline {
    /// Create a pipeline after validating `config`.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let merger = PanelMerger::new(&config.panel);
        let engine = FeatureEngine::new(&config.features);
        Ok(Self {
            config,
            merger,
            engine,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the data stages.
    ///
    /// `as_of` is the latest permissible month; it is never read from the
    /// clock.
    pub fn prepare(&self, raws: &[RawSeries], as_of: NaiveDate) -> Result<PreparedData> {
        let series = normalize_all(&self.config.sources, raws, as_of)?;
        let panel = self.merger.merge(&series, as_of)?;
        let training = self.engine.derive(&panel)?;

        info!(
            panel_rows = panel.len(),
            training_rows = training.len(),
            features = training.feature_columns().len(),
            "prepared training panel"
        );
        Ok(PreparedData { panel, training })
    }

    /// Feature generator seeded with the full merged history, so rolling
    /// windows at the last observed month see every row they need.
    pub fn feature_generator(&self, prepared: &PreparedData) -> Result<FeatureRowGenerator> {
        let base = prepared
            .panel
            .without_columns(&self.config.features.drop_columns)?;
        let generator = FeatureRowGenerator::new(&base, self.engine.specs())?;
        if generator.feature_columns() != prepared.training.feature_columns() {
            return Err(Error::invariant(format!(
                "generator features [{}] do not match training features [{}]",
                generator.feature_columns().join(", "),
                prepared.training.feature_columns().join(", ")
            )));
        }
        Ok(generator)
    }

    /// Full run: data stages followed by the forecast.
    pub fn run(
        &self,
        raws: &[RawSeries],
        estimator: Option<&dyn Estimator>,
        as_of: NaiveDate,
    ) -> Result<PipelineOutput> {
        let estimator =
            estimator.ok_or_else(|| Error::model_unavailable("no trained estimator supplied"))?;
        let prepared = self.prepare(raws, as_of)?;
        let report = self.forecast(&prepared, estimator)?;

        Ok(PipelineOutput {
            panel: prepared.panel,
            training: prepared.training,
            report,
        })
    }

    /// Forecast from already prepared data.
    pub fn forecast(
        &self,
        prepared: &PreparedData,
        estimator: &dyn Estimator,
    ) -> Result<ForecastReport> {
        let training = &prepared.training;
        let target = training.target_values();
        let current_month = training
            .months()
            .last()
            .copied()
            .ok_or_else(|| Error::insufficient_data("training panel has no rows"))?;
        let current_value = target
            .last()
            .copied()
            .ok_or_else(|| Error::insufficient_data("training panel has no rows"))?;

        let generator = self.feature_generator(prepared)?;
        let forecaster = Forecaster::from_config(&self.config.forecast, &target)?;
        let records = forecaster.forecast(Some(estimator), &generator)?;

        Ok(ForecastReport {
            model: estimator.name().to_string(),
            current_month,
            current_value,
            records,
        })
    }

    /// Holdout metrics of `estimator` on prepared data.
    pub fn evaluate(
        &self,
        prepared: &PreparedData,
        estimator: &dyn Estimator,
    ) -> Result<ForecastMetrics> {
        evaluate_holdout(
            &prepared.training,
            estimator,
            self.config.forecast.holdout_fraction,
        )
    }
}
