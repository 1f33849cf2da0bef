//! Configuration structures for the panel pipeline.

use crate::error::{Error, Result};
use crate::types::{month_start, Cadence, FeatureOp, FeatureSpec, NormalizationRule};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Main configuration for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Raw sources and the panel columns they become.
    pub sources: Vec<SourceConfig>,
    /// Panel merge configuration.
    pub panel: PanelConfig,
    /// Feature derivation configuration.
    pub features: FeatureConfig,
    /// Forecast configuration.
    pub forecast: ForecastConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: vec![
                SourceConfig::new("wti", "wti", Cadence::Daily),
                SourceConfig::new("currency", "eur_usd", Cadence::Daily),
                SourceConfig::new("inventory", "inventory", Cadence::Weekly),
                SourceConfig::new("production", "production", Cadence::Monthly),
                SourceConfig::new("rigs", "rigs", Cadence::Monthly),
                SourceConfig::new("refinery", "refinery_util", Cadence::Monthly),
                SourceConfig::new("gdp", "gdp", Cadence::Quarterly),
                SourceConfig::new("inflation", "inflation", Cadence::Annual),
            ],
            panel: PanelConfig::default(),
            features: FeatureConfig::default(),
            forecast: ForecastConfig::default(),
        }
    }
}

impl Config {
    /// Parse a configuration from JSON and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(Error::config("at least one source is required"));
        }

        let mut names = BTreeSet::new();
        let mut columns = BTreeSet::new();
        for source in &self.sources {
            if !names.insert(source.name.as_str()) {
                return Err(Error::config(format!("duplicate source '{}'", source.name)));
            }
            if !columns.insert(source.column.as_str()) {
                return Err(Error::config(format!("duplicate column '{}'", source.column)));
            }
        }

        if !columns.contains(self.panel.target.as_str()) {
            return Err(Error::config(format!(
                "target '{}' is not produced by any source",
                self.panel.target
            )));
        }
        for column in &self.panel.column_order {
            if !columns.contains(column.as_str()) {
                return Err(Error::config(format!(
                    "column_order names unknown column '{}'",
                    column
                )));
            }
        }
        for column in &self.features.drop_columns {
            if column == &self.panel.target {
                return Err(Error::config("the target column cannot be dropped"));
            }
        }

        self.features.validate()?;
        self.forecast.validate()?;
        Ok(())
    }
}

/// One raw source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Key the collector delivers the series under (e.g., "currency").
    pub name: String,
    /// Canonical panel column (e.g., "eur_usd").
    pub column: String,
    /// Declared native cadence.
    pub cadence: Cadence,
    /// Override for the cadence's default rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<NormalizationRule>,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, column: impl Into<String>, cadence: Cadence) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            cadence,
            rule: None,
        }
    }

    /// Rule actually applied to this source.
    pub fn effective_rule(&self) -> NormalizationRule {
        self.rule.unwrap_or_else(|| self.cadence.default_rule())
    }
}

/// Panel merge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Earliest permissible month.
    pub anchor_date: NaiveDate,
    /// Output column order; the target is always placed last.
    pub column_order: Vec<String>,
    /// Prediction target column.
    pub target: String,
}

impl PanelConfig {
    /// Anchor truncated to its month.
    pub fn anchor_month(&self) -> NaiveDate {
        month_start(self.anchor_date)
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            anchor_date: NaiveDate::from_ymd_opt(2005, 1, 1).unwrap_or_default(),
            column_order: [
                "eur_usd",
                "inventory",
                "production",
                "rigs",
                "refinery_util",
                "gdp",
                "inflation",
                "wti",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            target: "wti".to_string(),
        }
    }
}

/// Feature derivation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Columns removed before deriving features.
    #[serde(default)]
    pub drop_columns: Vec<String>,
    /// Derived features, applied in order.
    pub specs: Vec<FeatureSpec>,
    /// Leading rows trimmed after derivation.
    pub warmup_rows: usize,
    /// Columns that must never be negative after derivation.
    #[serde(default)]
    pub non_negative_columns: Vec<String>,
}

impl FeatureConfig {
    fn validate(&self) -> Result<()> {
        let mut names = BTreeSet::new();
        for spec in &self.specs {
            match spec.op {
                FeatureOp::RollingMean { window } if window == 0 => {
                    return Err(Error::config(format!("'{}': window must be positive", spec.name)));
                }
                FeatureOp::Lag { periods } if periods == 0 => {
                    return Err(Error::config(format!("'{}': lag must be positive", spec.name)));
                }
                _ => {}
            }
            if !names.insert(spec.name.as_str()) {
                return Err(Error::config(format!("duplicate feature '{}'", spec.name)));
            }
        }
        Ok(())
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            drop_columns: vec!["gdp".to_string(), "refinery_util".to_string()],
            specs: vec![
                FeatureSpec::rolling_mean("wti_6m_rolling", "wti", 6),
                FeatureSpec::rolling_mean("wti_12m_rolling", "wti", 12),
                FeatureSpec::lag("wti_6m_lag", "wti", 6),
            ],
            warmup_rows: 12,
            non_negative_columns: vec!["wti_6m_rolling".to_string(), "wti_12m_rolling".to_string()],
        }
    }
}

/// Shape of the interval half-width as the horizon grows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntervalGrowth {
    /// `base * (1 / decay_rate)^(step - 1)`.
    InverseDecay,
    /// `base * (1 + slope * (step - 1))`.
    Linear { slope: f64 },
}

impl Default for IntervalGrowth {
    fn default() -> Self {
        IntervalGrowth::InverseDecay
    }
}

/// Forecast configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Number of months to forecast.
    pub horizon: usize,
    /// Confidence of the first step.
    pub base_confidence: f64,
    /// Multiplicative confidence decay per step, in (0, 1).
    pub decay_rate: f64,
    /// Interval half-width of the first step. Derived from the target's
    /// dispersion when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_half_width: Option<f64>,
    /// Growth curve of the interval half-width.
    #[serde(default)]
    pub interval_growth: IntervalGrowth,
    /// Trailing fraction of rows used for holdout evaluation.
    #[serde(default = "default_holdout_fraction")]
    pub holdout_fraction: f64,
}

fn default_holdout_fraction() -> f64 {
    0.2
}

impl ForecastConfig {
    fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(Error::config("forecast horizon must be at least 1"));
        }
        if !(self.base_confidence > 0.0 && self.base_confidence <= 1.0) {
            return Err(Error::config("base_confidence must be in (0, 1]"));
        }
        if !(self.decay_rate > 0.0 && self.decay_rate < 1.0) {
            return Err(Error::config("decay_rate must be in (0, 1)"));
        }
        if let Some(width) = self.base_half_width {
            if !(width.is_finite() && width > 0.0) {
                return Err(Error::config("base_half_width must be a positive number"));
            }
        } else if self.base_confidence >= 1.0 {
            return Err(Error::config(
                "base_confidence must be below 1 when base_half_width is derived",
            ));
        }
        if let IntervalGrowth::Linear { slope } = self.interval_growth {
            if !(slope.is_finite() && slope > 0.0) {
                return Err(Error::config("linear interval slope must be positive"));
            }
        }
        if !(self.holdout_fraction > 0.0 && self.holdout_fraction < 1.0) {
            return Err(Error::config("holdout_fraction must be in (0, 1)"));
        }
        Ok(())
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon: 3,
            base_confidence: 0.8,
            decay_rate: 0.8,
            base_half_width: None,
            interval_growth: IntervalGrowth::InverseDecay,
            holdout_fraction: default_holdout_fraction(),
        }
    }
}
