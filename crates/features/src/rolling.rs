//! Rolling-window and lag kernels.
//!
//! Kernels work on nullable columns. A null input never produces a value:
//! it nulls every rolling window that contains it.

use mfpanel_core::FeatureOp;
use std::collections::VecDeque;

/// Rolling arithmetic mean over the last `window` observations.
pub struct RollingMean {
    /// Window size in periods.
    window: usize,
    /// Values currently in the window.
    values: VecDeque<Option<f64>>,
    /// Running sum of the present values.
    sum: f64,
    /// Nulls currently in the window.
    missing: usize,
}

impl RollingMean {
    /// Create a new rolling mean.
    pub fn new(window: usize) -> Self {
        Self {
            window,
            values: VecDeque::with_capacity(window),
            sum: 0.0,
            missing: 0,
        }
    }

    /// Add the next observation.
    ///
    /// Returns the mean once the window is full and holds no nulls.
    pub fn push(&mut self, value: Option<f64>) -> Option<f64> {
        if self.window == 0 {
            return None;
        }
        if self.values.len() >= self.window {
            match self.values.pop_front() {
                Some(Some(old)) => self.sum -= old,
                Some(None) => self.missing -= 1,
                None => {}
            }
        }

        match value {
            Some(v) if v.is_finite() => {
                self.sum += v;
                self.values.push_back(Some(v));
            }
            _ => {
                self.missing += 1;
                self.values.push_back(None);
            }
        }

        self.mean()
    }

    /// Current mean, if defined.
    pub fn mean(&self) -> Option<f64> {
        if self.is_ready() && self.missing == 0 {
            Some(self.sum / self.window as f64)
        } else {
            None
        }
    }

    /// Check if the window is full.
    pub fn is_ready(&self) -> bool {
        self.window > 0 && self.values.len() >= self.window
    }

    /// Get the number of observations in the window.
    pub fn count(&self) -> usize {
        self.values.len()
    }

    /// Clear all data.
    pub fn clear(&mut self) {
        self.values.clear();
        self.sum = 0.0;
        self.missing = 0;
    }
}

/// Rolling mean of a whole column; null for the first `window - 1` rows.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut roll = RollingMean::new(window);
    values.iter().map(|v| roll.push(*v)).collect()
}

/// Value `periods` rows earlier; null for the first `periods` rows.
pub fn lag(values: &[Option<f64>], periods: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| if i >= periods { values[i - periods] } else { None })
        .collect()
}

/// Apply a feature operation to a column.
pub fn apply_op(op: FeatureOp, values: &[Option<f64>]) -> Vec<Option<f64>> {
    match op {
        FeatureOp::RollingMean { window } => rolling_mean(values, window),
        FeatureOp::Lag { periods } => lag(values, periods),
    }
}
