//! Closed-form ridge regression over flattened windows
//!
//! Each window becomes one row of `time_steps * features` values. Inputs and
//! targets are centred, the normal equations `(XᵀX + αI) w = Xᵀy` are solved
//! with a Cholesky factorisation, and the intercept is recovered from the
//! means.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, ArrayView1, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{check_input_shape, check_training_set, FittedModel, Forecaster, ForecasterKind, ModelMetadata};
use crate::error::{PipelineError, Result};
use crate::sequence::flatten_windows;

#[derive(Debug, Clone, Copy)]
pub struct Ridge {
    alpha: f64,
}

impl Ridge {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }
}

/// Weights and intercept of a fitted ridge model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub alpha: f64,
    metadata: ModelMetadata,
}

/// Solve the symmetric system, adding a small diagonal jitter once if the
/// matrix is not numerically positive definite
fn cholesky_solve(gram: DMatrix<f64>, rhs: &DVector<f64>) -> Option<DVector<f64>> {
    let solve = |m: DMatrix<f64>| {
        m.cholesky()
            .map(|chol| chol.solve(rhs))
            .filter(|w| w.iter().all(|v| v.is_finite()))
    };
    if let Some(weights) = solve(gram.clone()) {
        return Some(weights);
    }
    let p = gram.nrows();
    let jitter = (1e-8 * gram.diagonal().iter().map(|v| v.abs()).sum::<f64>() / p.max(1) as f64)
        .max(f64::EPSILON);
    warn!(jitter, "gram matrix not positive definite; retrying with jitter");
    solve(gram + DMatrix::<f64>::identity(p, p) * jitter)
}

fn linear_predict(x: &ndarray::Array2<f64>, coefficients: &[f64], intercept: f64) -> Array1<f64> {
    x.outer_iter()
        .map(|row| {
            intercept
                + row
                    .iter()
                    .zip(coefficients.iter())
                    .map(|(v, w)| v * w)
                    .sum::<f64>()
        })
        .collect()
}

impl Forecaster for Ridge {
    fn name(&self) -> &str {
        "ridge"
    }

    fn train(
        &self,
        inputs: ArrayView3<'_, f64>,
        targets: ArrayView1<'_, f64>,
    ) -> Result<Box<dyn FittedModel>> {
        check_training_set(&inputs, &targets)?;
        if self.alpha.is_nan() || self.alpha < 0.0 {
            return Err(PipelineError::Model(format!(
                "ridge alpha must be non-negative, got {}",
                self.alpha
            )));
        }

        let x = flatten_windows(inputs);
        let (n, p) = x.dim();
        let x_mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| PipelineError::Model("empty design matrix".to_string()))?;
        let y_mean = targets.sum() / n as f64;

        let xc = DMatrix::from_fn(n, p, |r, c| x[[r, c]] - x_mean[c]);
        let yc = DVector::from_fn(n, |r, _| targets[r] - y_mean);

        let xt = xc.transpose();
        let gram = &xt * &xc + DMatrix::<f64>::identity(p, p) * self.alpha;
        let rhs = &xt * &yc;
        let weights = cholesky_solve(gram, &rhs).ok_or_else(|| {
            PipelineError::Model(
                "ridge normal equations are singular; increase model.ridge_alpha".to_string(),
            )
        })?;

        let coefficients: Vec<f64> = weights.iter().copied().collect();
        let intercept = y_mean
            - coefficients
                .iter()
                .zip(x_mean.iter())
                .map(|(w, m)| w * m)
                .sum::<f64>();

        let fitted = linear_predict(&x, &coefficients, intercept);
        let metadata = ModelMetadata::new(ForecasterKind::Ridge, inputs, targets, &fitted)?;
        debug!(
            windows = n,
            parameters = p,
            alpha = self.alpha,
            r2 = metadata.training_metrics.r2,
            "ridge model fitted"
        );

        Ok(Box::new(RidgeModel {
            coefficients,
            intercept,
            alpha: self.alpha,
            metadata,
        }))
    }
}

impl FittedModel for RidgeModel {
    fn predict(&self, inputs: ArrayView3<'_, f64>) -> Result<Array1<f64>> {
        check_input_shape(&self.metadata, &inputs)?;
        let x = flatten_windows(inputs);
        Ok(linear_predict(&x, &self.coefficients, self.intercept))
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}
