//! Forecast Metrics and Evaluation
//!
//! Accuracy metrics for GHI forecasts, computed on values that have already
//! been inverse-scaled back to physical units (W/m²).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MetricsError;

/// Below this the mean of the actual series is treated as zero
const MEAN_EPSILON: f64 = 1e-12;

/// Forecast accuracy metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// R² (coefficient of determination)
    pub r2: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Square Error
    pub rmse: f64,
    /// Mean Bias Error, mean(actual - predicted)
    pub mbe: f64,
    /// RMSE / mean(actual); None when the mean is zero
    pub rrmse: Option<f64>,
    /// MBE / mean(actual); None when the mean is zero
    pub rmbe: Option<f64>,
    /// Largest absolute error observed
    pub max_error: f64,
    /// Number of samples evaluated
    pub sample_count: usize,
}

impl ForecastMetrics {
    /// Calculate metrics from actual and predicted values
    pub fn calculate(actual: &[f64], predicted: &[f64]) -> Result<Self, MetricsError> {
        if actual.len() != predicted.len() {
            return Err(MetricsError::DimensionMismatch {
                actual: actual.len(),
                predicted: predicted.len(),
            });
        }

        if actual.is_empty() {
            return Err(MetricsError::EmptyData);
        }

        let n = actual.len() as f64;
        let errors: Vec<f64> = actual
            .iter()
            .zip(predicted.iter())
            .map(|(a, p)| a - p)
            .collect();

        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
        let sse: f64 = errors.iter().map(|e| e * e).sum();
        let mse = sse / n;
        let rmse = mse.sqrt();
        let mbe = errors.iter().sum::<f64>() / n;
        let max_error = errors.iter().map(|e| e.abs()).fold(0.0f64, f64::max);

        let mean_actual = actual.iter().sum::<f64>() / n;
        let total_variance: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();

        // Constant actual series: only a perfect prediction scores 1
        let r2 = if total_variance > 0.0 {
            1.0 - sse / total_variance
        } else if sse == 0.0 {
            1.0
        } else {
            0.0
        };

        let (rrmse, rmbe) = if mean_actual.abs() < MEAN_EPSILON {
            (None, None)
        } else {
            (Some(rmse / mean_actual), Some(mbe / mean_actual))
        };

        Ok(ForecastMetrics {
            r2,
            mae,
            mse,
            rmse,
            mbe,
            rrmse,
            rmbe,
            max_error,
            sample_count: actual.len(),
        })
    }
}

impl fmt::Display for ForecastMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "R²={:.4}, MAE={:.4}, MSE={:.4}, RMSE={:.4}, MBE={:.4}",
            self.r2, self.mae, self.mse, self.rmse, self.mbe
        )?;
        if let (Some(rrmse), Some(rmbe)) = (self.rrmse, self.rmbe) {
            write!(f, ", RRMSE={rrmse:.4}, RMBE={rmbe:.4}")?;
        }
        write!(f, " (n={})", self.sample_count)
    }
}
