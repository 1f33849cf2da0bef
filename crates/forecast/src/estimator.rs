//! Estimator seam.
//!
//! Models are trained and serialized elsewhere; the forecaster only needs
//! something that maps one feature vector to one scalar.

use mfpanel_core::{Error, Result, TrainingReadyPanel};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// A trained model.
pub trait Estimator {
    /// Predict the target from one feature vector.
    fn predict(&self, features: &[f64]) -> Result<f64>;

    /// Name used in logs and reports.
    fn name(&self) -> &str {
        "estimator"
    }
}

impl<E: Estimator + ?Sized> Estimator for &E {
    fn predict(&self, features: &[f64]) -> Result<f64> {
        (**self).predict(features)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<E: Estimator + ?Sized> Estimator for Box<E> {
    fn predict(&self, features: &[f64]) -> Result<f64> {
        (**self).predict(features)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Linear model `intercept + coefficients · x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LinearModel {
    pub fn new(intercept: f64, coefficients: Vec<f64>) -> Self {
        Self {
            intercept,
            coefficients,
        }
    }
}

impl Estimator for LinearModel {
    fn predict(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.coefficients.len() {
            return Err(Error::prediction(format!(
                "expected {} features, got {}",
                self.coefficients.len(),
                features.len()
            )));
        }
        Ok(self.intercept
            + self
                .coefficients
                .iter()
                .zip(features)
                .map(|(c, x)| c * x)
                .sum::<f64>())
    }

    fn name(&self) -> &str {
        "linear"
    }
}

/// Per-column standardization fitted on a training panel.
///
/// Uses population statistics. A zero-variance column maps to 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Feature columns, in the order vectors are expected.
    pub columns: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on every feature column of `training`.
    pub fn fit(training: &TrainingReadyPanel) -> Result<Self> {
        let mut columns = Vec::new();
        let mut mean = Vec::new();
        let mut scale = Vec::new();

        for name in training.feature_columns() {
            let values = training
                .values(name)
                .ok_or_else(|| Error::invariant(format!("feature column '{}' vanished", name)))?;
            columns.push(name.to_string());
            mean.push(values.iter().mean());
            scale.push(values.iter().population_std_dev());
        }

        Ok(Self {
            columns,
            mean,
            scale,
        })
    }

    /// Standardize one feature vector.
    pub fn transform(&self, features: &[f64]) -> Result<Vec<f64>> {
        if features.len() != self.mean.len() {
            return Err(Error::invariant(format!(
                "scaler fitted on {} features, got {}",
                self.mean.len(),
                features.len()
            )));
        }
        Ok(features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| if *s > 0.0 { (x - m) / s } else { 0.0 })
            .collect())
    }
}

/// Estimator that standardizes features before delegating.
#[derive(Debug, Clone)]
pub struct ScaledEstimator<E> {
    scaler: StandardScaler,
    inner: E,
}

impl<E: Estimator> ScaledEstimator<E> {
    pub fn new(scaler: StandardScaler, inner: E) -> Self {
        Self { scaler, inner }
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

impl<E: Estimator> Estimator for ScaledEstimator<E> {
    fn predict(&self, features: &[f64]) -> Result<f64> {
        let scaled = self.scaler.transform(features)?;
        self.inner.predict(&scaled)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
