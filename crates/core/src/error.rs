//! Error types for the panel pipeline.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

fn join_dates(dates: &[NaiveDate]) -> String {
    dates
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Main error type for the panel pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Required column missing, or a value that is not numeric.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A month with no derivable value after the cadence rule was applied.
    #[error("Gap error: series '{series}' has no value for {month}")]
    Gap { series: String, month: NaiveDate },

    /// A column missing a month inside the merge window.
    #[error("Merge gap: column '{column}' has no value for {month}")]
    MergeGap { column: String, month: NaiveDate },

    /// Internal consistency violated despite upstream validation.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// A date is not the first day of its month.
    #[error("Date {0} is not the first day of a month")]
    NotMonthStart(NaiveDate),

    /// Two successive dates are not exactly one calendar month apart.
    #[error("Non-contiguous months: {next} follows {previous}")]
    NonContiguous { previous: NaiveDate, next: NaiveDate },

    /// A null or non-finite cell.
    #[error("Null value in column '{column}' at {month}")]
    NullValue { column: String, month: NaiveDate },

    /// A value outside its permitted range.
    #[error("Value {value} in column '{column}' at {month} is out of range")]
    OutOfRange {
        column: String,
        month: NaiveDate,
        value: f64,
    },

    /// Dates strictly after the as-of date.
    #[error("Future dates after {as_of}: {}", join_dates(.dates))]
    FutureDate {
        dates: Vec<NaiveDate>,
        as_of: NaiveDate,
    },

    /// Repeated dates.
    #[error("Duplicate dates: {}", join_dates(.dates))]
    DuplicateDate { dates: Vec<NaiveDate> },

    /// No trained estimator could be resolved.
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Lag/rolling inputs missing for a forecast step.
    #[error("Feature gap: '{feature}' cannot be computed for {month}")]
    FeatureGap { feature: String, month: NaiveDate },

    /// The estimator failed to produce a prediction.
    #[error("Prediction error: {0}")]
    Prediction(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Insufficient data for computation.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a schema error.
    pub fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }

    /// Create a gap error.
    pub fn gap(series: impl Into<String>, month: NaiveDate) -> Self {
        Error::Gap {
            series: series.into(),
            month,
        }
    }

    /// Create a merge gap error.
    pub fn merge_gap(column: impl Into<String>, month: NaiveDate) -> Self {
        Error::MergeGap {
            column: column.into(),
            month,
        }
    }

    /// Create an invariant error.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Error::Invariant(msg.into())
    }

    /// Create a model unavailable error.
    pub fn model_unavailable(msg: impl Into<String>) -> Self {
        Error::ModelUnavailable(msg.into())
    }

    /// Create a feature gap error.
    pub fn feature_gap(feature: impl Into<String>, month: NaiveDate) -> Self {
        Error::FeatureGap {
            feature: feature.into(),
            month,
        }
    }

    /// Create a prediction error.
    pub fn prediction(msg: impl Into<String>) -> Self {
        Error::Prediction(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an insufficient data error.
    pub fn insufficient_data(msg: impl Into<String>) -> Self {
        Error::InsufficientData(msg.into())
    }
}
