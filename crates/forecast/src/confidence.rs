//! Per-step confidence and prediction-interval schedule.

use mfpanel_core::{Error, ForecastConfig, IntervalGrowth, Result};
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::statistics::Statistics;

/// Confidence decays and the interval widens as the horizon grows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceSchedule {
    base_confidence: f64,
    decay_rate: f64,
    base_half_width: f64,
    growth: IntervalGrowth,
}

impl ConfidenceSchedule {
    pub fn new(
        base_confidence: f64,
        decay_rate: f64,
        base_half_width: f64,
        growth: IntervalGrowth,
    ) -> Result<Self> {
        if !(base_confidence > 0.0 && base_confidence <= 1.0) {
            return Err(Error::config("base_confidence must be in (0, 1]"));
        }
        if !(decay_rate > 0.0 && decay_rate < 1.0) {
            return Err(Error::config("decay_rate must be in (0, 1)"));
        }
        if !(base_half_width.is_finite() && base_half_width > 0.0) {
            return Err(Error::config("base half-width must be a positive number"));
        }
        if let IntervalGrowth::Linear { slope } = growth {
            if !(slope.is_finite() && slope > 0.0) {
                return Err(Error::config("linear interval slope must be positive"));
            }
        }
        Ok(Self {
            base_confidence,
            decay_rate,
            base_half_width,
            growth,
        })
    }

    /// Build from configuration, deriving the base half-width from the
    /// target history when it is not configured.
    pub fn from_config(config: &ForecastConfig, target: &[f64]) -> Result<Self> {
        let base_half_width = match config.base_half_width {
            Some(width) => width,
            None => derive_half_width(config.base_confidence, target)?,
        };
        Self::new(
            config.base_confidence,
            config.decay_rate,
            base_half_width,
            config.interval_growth,
        )
    }

    /// Confidence of step `step` (1-based).
    pub fn confidence(&self, step: usize) -> f64 {
        self.base_confidence * self.decay_rate.powi(exponent(step))
    }

    /// Interval half-width of step `step` (1-based).
    pub fn half_width(&self, step: usize) -> f64 {
        match self.growth {
            IntervalGrowth::InverseDecay => {
                self.base_half_width * (1.0 / self.decay_rate).powi(exponent(step))
            }
            IntervalGrowth::Linear { slope } => {
                self.base_half_width * (1.0 + slope * f64::from(exponent(step)))
            }
        }
    }

    pub fn base_half_width(&self) -> f64 {
        self.base_half_width
    }
}

fn exponent(step: usize) -> i32 {
    i32::try_from(step.saturating_sub(1)).unwrap_or(i32::MAX)
}

/// Two-sided normal quantile at `confidence` times the sample standard
/// deviation of `target`.
pub fn derive_half_width(confidence: f64, target: &[f64]) -> Result<f64> {
    if target.len() < 2 {
        return Err(Error::insufficient_data(
            "at least two target values are needed to size the interval",
        ));
    }
    let std = target.iter().std_dev();
    if !(std > 0.0) {
        return Err(Error::insufficient_data(
            "target history has no dispersion to size the interval",
        ));
    }
    let normal = Normal::new(0.0, 1.0).map_err(|e| Error::invariant(e.to_string()))?;
    let z = normal.inverse_cdf((1.0 + confidence) / 2.0);
    let width = z * std;
    if !width.is_finite() {
        return Err(Error::config(format!(
            "cannot size an interval at confidence {}",
            confidence
        )));
    }
    Ok(width)
}
