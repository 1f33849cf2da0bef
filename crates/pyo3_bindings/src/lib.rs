//! PyO3 bindings for the mfpanel pipeline.
//!
//! Exposes the Rust pipeline to Python:
//! - Logging setup
//! - Panel preparation (normalize, merge, derive)
//! - Forecasting with any Python object that has a `predict` method

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use mfpanel_core::{
    Config, Error as RustError, ForecastRecord as RustForecastRecord, Panel, RawSeries,
    Result as RustResult,
};
use mfpanel_forecast::{Estimator, Pipeline};
use mfpanel_ingestion::parse_rows;

fn to_py_err(err: RustError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

// ============================================================================
// Python-exposed Types
// ============================================================================

/// One forecast step.
#[pyclass]
#[derive(Clone)]
pub struct ForecastRecord {
    /// ISO date of the forecast month.
    #[pyo3(get)]
    pub forecast_date: String,
    #[pyo3(get)]
    pub predicted_value: f64,
    #[pyo3(get)]
    pub interval_lower: f64,
    #[pyo3(get)]
    pub interval_upper: f64,
    #[pyo3(get)]
    pub confidence: f64,
}

#[pymethods]
impl ForecastRecord {
    /// Width of the prediction interval.
    #[getter]
    fn interval_width(&self) -> f64 {
        self.interval_upper - self.interval_lower
    }

    fn __repr__(&self) -> String {
        format!(
            "ForecastRecord(forecast_date={}, predicted_value={:.4}, interval=[{:.4}, {:.4}], confidence={:.3})",
            self.forecast_date,
            self.predicted_value,
            self.interval_lower,
            self.interval_upper,
            self.confidence
        )
    }
}

impl From<&RustForecastRecord> for ForecastRecord {
    fn from(r: &RustForecastRecord) -> Self {
        ForecastRecord {
            forecast_date: r.forecast_date.to_string(),
            predicted_value: r.predicted_value,
            interval_lower: r.interval_lower,
            interval_upper: r.interval_upper,
            confidence: r.confidence,
        }
    }
}

// ============================================================================
// Estimator Adapter
// ============================================================================

/// Python model with a scikit-learn style `predict(X)`.
struct PyEstimator {
    model: PyObject,
    name: String,
}

impl PyEstimator {
    fn new(py: Python<'_>, model: PyObject) -> Self {
        let name = model
            .bind(py)
            .get_type()
            .name()
            .map(|n| n.to_string())
            .unwrap_or_else(|_| "python".to_string());
        PyEstimator { model, name }
    }
}

impl Estimator for PyEstimator {
    fn predict(&self, features: &[f64]) -> RustResult<f64> {
        Python::with_gil(|py| -> PyResult<f64> {
            let out = self
                .model
                .call_method1(py, "predict", (vec![features.to_vec()],))?;
            out.bind(py).get_item(0)?.extract::<f64>()
        })
        .map_err(|e| RustError::prediction(e.to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Conversions
// ============================================================================

type RawInput = HashMap<String, Vec<(String, f64)>>;

/// Raw `(iso_date, value)` pairs to typed series, using each source's
/// configured cadence. Unconfigured keys are passed through untouched and
/// ignored by normalization.
fn raw_series(config: &Config, raw: &RawInput) -> RustResult<Vec<RawSeries>> {
    let mut names: Vec<&String> = raw.keys().collect();
    names.sort();

    names
        .into_iter()
        .filter_map(|name| {
            let source = config.sources.iter().find(|s| &s.name == name)?;
            let rows: Vec<serde_json::Value> = raw[name]
                .iter()
                .map(|(date, value)| json!({ "date": date, "value": value }))
                .collect();
            Some(parse_rows(name, source.cadence, &rows))
        })
        .collect()
}

fn parse_as_of(as_of: Option<String>) -> PyResult<NaiveDate> {
    match as_of {
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|e| PyValueError::new_err(format!("invalid as_of '{}': {}", s, e))),
        None => Ok(Utc::now().date_naive()),
    }
}

fn panel_to_dict<'py>(py: Python<'py>, panel: &Panel) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    let dates: Vec<String> = panel.months().iter().map(|m| m.to_string()).collect();
    dict.set_item("date", dates)?;
    for column in panel.columns() {
        let values: Vec<f64> = column
            .values
            .iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        dict.set_item(column.name.as_str(), values)?;
    }
    Ok(dict)
}

// ============================================================================
// Pipeline
// ============================================================================

/// Configured forecasting pipeline.
#[pyclass(name = "Pipeline")]
pub struct PyPipeline {
    inner: Pipeline,
}

#[pymethods]
impl PyPipeline {
    /// Create from a JSON configuration, or the default one.
    #[new]
    #[pyo3(signature = (config_json = None))]
    fn new(config_json: Option<String>) -> PyResult<Self> {
        let config = match config_json {
            Some(json) => Config::from_json_str(&json).map_err(to_py_err)?,
            None => Config::default(),
        };
        Ok(PyPipeline {
            inner: Pipeline::new(config).map_err(to_py_err)?,
        })
    }

    /// Current configuration as JSON.
    fn config_json(&self) -> PyResult<String> {
        serde_json::to_string(self.inner.config())
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    /// Build the training-ready panel as `{column: [values]}` plus `date`.
    #[pyo3(signature = (raw, as_of = None))]
    fn prepare<'py>(
        &self,
        py: Python<'py>,
        raw: RawInput,
        as_of: Option<String>,
    ) -> PyResult<Bound<'py, PyDict>> {
        let as_of = parse_as_of(as_of)?;
        let raws = raw_series(self.inner.config(), &raw).map_err(to_py_err)?;
        let prepared = self.inner.prepare(&raws, as_of).map_err(to_py_err)?;
        panel_to_dict(py, prepared.training.panel())
    }

    /// Prepare and forecast with `model`.
    #[pyo3(signature = (raw, model, as_of = None))]
    fn run(
        &self,
        py: Python<'_>,
        raw: RawInput,
        model: Option<PyObject>,
        as_of: Option<String>,
    ) -> PyResult<Vec<ForecastRecord>> {
        let as_of = parse_as_of(as_of)?;
        let raws = raw_series(self.inner.config(), &raw).map_err(to_py_err)?;
        let estimator = model.map(|m| PyEstimator::new(py, m));
        let output = self
            .inner
            .run(&raws, estimator.as_ref().map(|e| e as &dyn Estimator), as_of)
            .map_err(to_py_err)?;
        Ok(output.report.records.iter().map(ForecastRecord::from).collect())
    }
}

// ============================================================================
// Module Definition
// ============================================================================

/// Install a `tracing` subscriber filtered at `level` (e.g. "info",
/// "mfpanel_ingestion=debug").
#[pyfunction]
#[pyo3(signature = (level = "info"))]
fn init_logging(level: &str) -> PyResult<()> {
    let filter = EnvFilter::try_new(level).map_err(|e| PyValueError::new_err(e.to_string()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| PyValueError::new_err(e.to_string()))
}

#[pymodule]
fn mfpanel(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Functions
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;

    // Types
    m.add_class::<ForecastRecord>()?;
    m.add_class::<PyPipeline>()?;

    Ok(())
}
