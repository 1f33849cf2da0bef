//! Forecasting layer.
//!
//! Provides:
//! - The estimator seam and a feature scaler
//! - Confidence and interval schedules
//! - The recursive multi-step forecaster
//! - Holdout evaluation metrics
//! - End-to-end pipeline orchestration

pub mod confidence;
pub mod estimator;
pub mod forecaster;
pub mod metrics;
pub mod pipeline;

pub use confidence::ConfidenceSchedule;
pub use estimator::{Estimator, LinearModel, ScaledEstimator, StandardScaler};
pub use forecaster::{FeatureRowGenerator, Forecaster};
pub use metrics::{evaluate_holdout, ForecastMetrics};
pub use pipeline::{ForecastReport, Pipeline, PipelineOutput, PreparedData};
