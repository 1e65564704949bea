//! Forecasting backends
//!
//! The pipeline only talks to a model through [`Forecaster`] (untrained) and
//! [`FittedModel`] (trained). Any backend that consumes the windowed tensors
//! can be plugged in; the crate ships three reference ones:
//! - `persistence`: last observed target inside the window
//! - `ridge`: closed-form ridge regression over flattened windows
//! - `random_forest`: smartcore random forest (feature `ml`)
//!
//! All backends work in scaled units. Inverse scaling happens afterwards, in
//! the pipeline.

use chrono::{DateTime, Utc};
use ndarray::{Array1, ArrayView1, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::{ConfigError, PipelineError, Result};
use crate::forecast::ForecastMetrics;

pub mod baseline;
pub mod ridge;

#[cfg(feature = "ml")]
pub mod smartcore;

pub use baseline::Persistence;
pub use ridge::Ridge;

/// Backend selector used in configuration
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ForecasterKind {
    Persistence,
    Ridge,
    RandomForest,
}

/// Facts about a trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub kind: ForecasterKind,
    pub trained_at: DateTime<Utc>,
    pub training_samples: usize,
    pub time_steps: usize,
    pub n_features: usize,
    /// In-sample fit on the training windows, scaled units
    pub training_metrics: ForecastMetrics,
}

impl ModelMetadata {
    pub fn new(
        kind: ForecasterKind,
        inputs: ArrayView3<'_, f64>,
        targets: ArrayView1<'_, f64>,
        fitted: &Array1<f64>,
    ) -> Result<Self> {
        let (_, time_steps, n_features) = inputs.dim();
        let actual = targets.to_vec();
        let training_metrics = ForecastMetrics::calculate(&actual, &fitted.to_vec())?;
        Ok(Self {
            model_id: format!("{kind}_{}", uuid::Uuid::new_v4()),
            kind,
            trained_at: Utc::now(),
            training_samples: actual.len(),
            time_steps,
            n_features,
            training_metrics,
        })
    }
}

/// An untrained backend
pub trait Forecaster {
    fn name(&self) -> &str;

    /// Fit on `inputs` of shape (windows, time_steps, features) and one
    /// target per window
    fn train(
        &self,
        inputs: ArrayView3<'_, f64>,
        targets: ArrayView1<'_, f64>,
    ) -> Result<Box<dyn FittedModel>>;
}

/// A trained backend, read-only
pub trait FittedModel {
    /// One prediction per window
    fn predict(&self, inputs: ArrayView3<'_, f64>) -> Result<Array1<f64>>;

    fn metadata(&self) -> &ModelMetadata;
}

/// Build the backend named in `config`.
///
/// `target_input` is the position of the target column inside each window
/// row; persistence needs it and fails without it.
pub fn build_forecaster(
    config: &ModelConfig,
    target_input: Option<usize>,
) -> Result<Box<dyn Forecaster>> {
    match config.kind {
        ForecasterKind::Persistence => {
            let target = target_input.ok_or_else(|| {
                ConfigError::Invalid(
                    "persistence needs the target column among the window inputs".to_string(),
                )
            })?;
            Ok(Box::new(Persistence::new(target)))
        }
        ForecasterKind::Ridge => Ok(Box::new(Ridge::new(config.ridge_alpha))),
        #[cfg(feature = "ml")]
        ForecasterKind::RandomForest => Ok(Box::new(smartcore::RandomForest::from_config(config))),
        #[cfg(not(feature = "ml"))]
        ForecasterKind::RandomForest => Err(ConfigError::Invalid(
            "random_forest requires the `ml` feature".to_string(),
        )
        .into()),
    }
}

/// Predict and check that the backend returned exactly one value per window
pub fn predict_windows(model: &dyn FittedModel, inputs: ArrayView3<'_, f64>) -> Result<Array1<f64>> {
    let windows = inputs.len_of(Axis(0));
    let predicted = model.predict(inputs)?;
    if predicted.len() != windows {
        return Err(PipelineError::alignment(
            format!("{} predictions", model.metadata().kind),
            windows,
            predicted.len(),
        ));
    }
    Ok(predicted)
}

/// Shared sanity checks on a training set
pub(crate) fn check_training_set(
    inputs: &ArrayView3<'_, f64>,
    targets: &ArrayView1<'_, f64>,
) -> Result<()> {
    let windows = inputs.len_of(Axis(0));
    if windows == 0 {
        return Err(PipelineError::Model("cannot train on an empty window set".to_string()));
    }
    if windows != targets.len() {
        return Err(PipelineError::alignment(
            "training windows vs targets",
            windows,
            targets.len(),
        ));
    }
    Ok(())
}

/// Inputs must have the window shape the model was trained on
pub(crate) fn check_input_shape(metadata: &ModelMetadata, inputs: &ArrayView3<'_, f64>) -> Result<()> {
    let (_, time_steps, n_features) = inputs.dim();
    if (time_steps, n_features) != (metadata.time_steps, metadata.n_features) {
        return Err(PipelineError::Model(format!(
            "model {} expects windows of {}x{}, got {}x{}",
            metadata.model_id, metadata.time_steps, metadata.n_features, time_steps, n_features
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array3};

    /// Backend that drops the last prediction
    struct ShortForecaster;

    struct ShortModel {
        metadata: ModelMetadata,
    }

    impl Forecaster for ShortForecaster {
        fn name(&self) -> &str {
            "short"
        }

        fn train(
            &self,
            inputs: ArrayView3<'_, f64>,
            targets: ArrayView1<'_, f64>,
        ) -> Result<Box<dyn FittedModel>> {
            let fitted = targets.to_owned();
            let metadata = ModelMetadata::new(ForecasterKind::Ridge, inputs, targets, &fitted)?;
            Ok(Box::new(ShortModel { metadata }))
        }
    }

    impl FittedModel for ShortModel {
        fn predict(&self, inputs: ArrayView3<'_, f64>) -> Result<Array1<f64>> {
            Ok(Array1::zeros(inputs.len_of(Axis(0)) - 1))
        }

        fn metadata(&self) -> &ModelMetadata {
            &self.metadata
        }
    }

    fn inputs() -> Array3<f64> {
        Array3::from_shape_fn((4, 3, 2), |(i, t, f)| (i + t + f) as f64)
    }

    #[test]
    fn test_short_predictions_are_alignment_error() {
        let x = inputs();
        let y = Array1::from(vec![1.0, 2.0, 3.0, 4.0]);
        let model = ShortForecaster.train(x.view(), y.view()).unwrap();
        let err = predict_windows(model.as_ref(), x.view()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Alignment {
                expected: 4,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_metadata_records_shape_and_fit() {
        let x = inputs();
        let y = Array1::from(vec![1.0, 2.0, 3.0, 4.0]);
        let meta = ModelMetadata::new(ForecasterKind::Persistence, x.view(), y.view(), &y).unwrap();
        assert_eq!(meta.training_samples, 4);
        assert_eq!((meta.time_steps, meta.n_features), (3, 2));
        assert_eq!(meta.training_metrics.r2, 1.0);
        assert!(meta.model_id.starts_with("persistence_"));
    }

    #[test]
    fn test_training_set_checks() {
        let x = inputs();
        let y = Array1::from(vec![1.0, 2.0]);
        assert!(matches!(
            check_training_set(&x.view(), &y.view()),
            Err(PipelineError::Alignment { .. })
        ));
        let empty = Array3::<f64>::zeros((0, 3, 2));
        let none = Array1::<f64>::zeros(0);
        assert!(matches!(
            check_training_set(&empty.view(), &none.view()),
            Err(PipelineError::Model(_))
        ));
    }

    #[test]
    fn test_build_forecaster() {
        let mut config = ModelConfig::default();
        assert_eq!(build_forecaster(&config, Some(0)).unwrap().name(), "ridge");

        config.kind = ForecasterKind::Persistence;
        assert_eq!(build_forecaster(&config, Some(0)).unwrap().name(), "persistence");
        assert!(build_forecaster(&config, None).is_err());
    }

    #[test]
    fn test_kind_parses_snake_case() {
        assert_eq!(
            "random_forest".parse::<ForecasterKind>().unwrap(),
            ForecasterKind::RandomForest
        );
        assert_eq!(ForecasterKind::Persistence.to_string(), "persistence");
    }
}
