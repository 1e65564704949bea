//! Persistence baseline: the forecast is the last observed target value
//! inside the window. Any useful model has to beat it.

use ndarray::{Array1, ArrayView1, ArrayView3, Axis};
use tracing::debug;

use super::{check_input_shape, check_training_set, FittedModel, Forecaster, ForecasterKind, ModelMetadata};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy)]
pub struct Persistence {
    /// Index of the target column inside a window row
    target_feature: usize,
}

impl Persistence {
    pub fn new(target_feature: usize) -> Self {
        Self { target_feature }
    }
}

#[derive(Debug, Clone)]
pub struct PersistenceModel {
    target_feature: usize,
    metadata: ModelMetadata,
}

fn last_observed(inputs: &ArrayView3<'_, f64>, target_feature: usize) -> Result<Array1<f64>> {
    let (_, time_steps, n_features) = inputs.dim();
    if time_steps == 0 {
        return Err(PipelineError::Model("windows have no time steps".to_string()));
    }
    if target_feature >= n_features {
        return Err(PipelineError::Model(format!(
            "target feature index {target_feature} out of range for {n_features} input columns"
        )));
    }
    Ok(inputs
        .index_axis(Axis(1), time_steps - 1)
        .index_axis(Axis(1), target_feature)
        .to_owned())
}

impl Forecaster for Persistence {
    fn name(&self) -> &str {
        "persistence"
    }

    fn train(
        &self,
        inputs: ArrayView3<'_, f64>,
        targets: ArrayView1<'_, f64>,
    ) -> Result<Box<dyn FittedModel>> {
        check_training_set(&inputs, &targets)?;
        let fitted = last_observed(&inputs, self.target_feature)?;
        let metadata = ModelMetadata::new(ForecasterKind::Persistence, inputs, targets, &fitted)?;
        debug!(
            windows = metadata.training_samples,
            r2 = metadata.training_metrics.r2,
            "persistence baseline ready"
        );
        Ok(Box::new(PersistenceModel {
            target_feature: self.target_feature,
            metadata,
        }))
    }
}

impl FittedModel for PersistenceModel {
    fn predict(&self, inputs: ArrayView3<'_, f64>) -> Result<Array1<f64>> {
        check_input_shape(&self.metadata, &inputs)?;
        last_observed(&inputs, self.target_feature)
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_predicts_last_target_in_window() {
        // feature 1 is the target, value = 10 * window + step
        let x = Array3::from_shape_fn((3, 4, 2), |(i, t, f)| {
            if f == 1 {
                (10 * i + t) as f64
            } else {
                -1.0
            }
        });
        let y = Array1::from(vec![4.0, 14.0, 24.0]);
        let model = Persistence::new(1).train(x.view(), y.view()).unwrap();
        assert_eq!(model.predict(x.view()).unwrap().to_vec(), vec![3.0, 13.0, 23.0]);
        assert!((model.metadata().training_metrics.mae - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_range_target_feature() {
        let x = Array3::<f64>::zeros((2, 3, 1));
        let y = Array1::zeros(2);
        assert!(matches!(
            Persistence::new(1).train(x.view(), y.view()),
            Err(PipelineError::Model(_))
        ));
    }

    #[test]
    fn test_rejects_different_window_shape() {
        let x = Array3::<f64>::ones((2, 3, 1));
        let y = Array1::ones(2);
        let model = Persistence::new(0).train(x.view(), y.view()).unwrap();
        let wider = Array3::<f64>::ones((2, 4, 1));
        assert!(model.predict(wider.view()).is_err());
    }
}
