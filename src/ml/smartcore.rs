//! SmartCore random forest over flattened windows
//!
//! Conservative defaults (50 trees, depth 10) keep training time and memory
//! bounded on small machines.

use ndarray::{Array1, Array2, ArrayView1, ArrayView3};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use tracing::debug;

use super::{check_input_shape, check_training_set, FittedModel, Forecaster, ForecasterKind, ModelMetadata};
use crate::config::ModelConfig;
use crate::error::{PipelineError, Result};
use crate::sequence::flatten_windows;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

#[derive(Debug, Clone)]
pub struct RandomForest {
    pub n_trees: usize,
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: Some(10),
            min_samples_split: 5,
            min_samples_leaf: 2,
            seed: 42,
        }
    }
}

impl RandomForest {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            n_trees: config.n_trees,
            max_depth: config.max_depth,
            seed: config.seed,
            ..Self::default()
        }
    }

    pub fn parameters(&self) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            min_samples_split: self.min_samples_split,
            n_trees: self.n_trees,
            m: None, // sqrt(n_features)
            keep_samples: false,
            seed: self.seed,
        }
    }
}

fn dense(x: &Array2<f64>) -> DenseMatrix<f64> {
    let (rows, cols) = x.dim();
    DenseMatrix::new(rows, cols, x.iter().copied().collect(), false)
}

pub struct RandomForestModel {
    forest: Forest,
    metadata: ModelMetadata,
}

impl RandomForestModel {
    fn predict_flat(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let predicted = self
            .forest
            .predict(&dense(x))
            .map_err(|e| PipelineError::Model(format!("random forest prediction failed: {e:?}")))?;
        Ok(Array1::from(predicted))
    }
}

impl Forecaster for RandomForest {
    fn name(&self) -> &str {
        "random_forest"
    }

    fn train(
        &self,
        inputs: ArrayView3<'_, f64>,
        targets: ArrayView1<'_, f64>,
    ) -> Result<Box<dyn FittedModel>> {
        check_training_set(&inputs, &targets)?;

        let x = flatten_windows(inputs);
        let y = targets.to_vec();
        let forest = Forest::fit(&dense(&x), &y, self.parameters())
            .map_err(|e| PipelineError::Model(format!("random forest training failed: {e:?}")))?;

        let fitted = Array1::from(
            forest
                .predict(&dense(&x))
                .map_err(|e| PipelineError::Model(format!("prediction failed during training: {e:?}")))?,
        );
        let metadata = ModelMetadata::new(ForecasterKind::RandomForest, inputs, targets, &fitted)?;
        debug!(
            windows = metadata.training_samples,
            n_trees = self.n_trees,
            r2 = metadata.training_metrics.r2,
            "random forest fitted"
        );

        Ok(Box::new(RandomForestModel { forest, metadata }))
    }
}

impl FittedModel for RandomForestModel {
    fn predict(&self, inputs: ArrayView3<'_, f64>) -> Result<Array1<f64>> {
        check_input_shape(&self.metadata, &inputs)?;
        self.predict_flat(&flatten_windows(inputs))
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}
