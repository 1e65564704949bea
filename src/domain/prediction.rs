use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::SegmentKind;
use crate::error::{PipelineError, Result};
use crate::forecast::ForecastMetrics;

/// One evaluated window, in physical units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Timestamp of the target row
    pub timestamp: NaiveDateTime,
    pub actual: f64,
    pub predicted: f64,
}

/// Predictions and metrics of one (segment, horizon) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonForecast {
    pub segment: SegmentKind,
    pub horizon: usize,
    pub records: Vec<PredictionRecord>,
    pub metrics: ForecastMetrics,
}

impl HorizonForecast {
    /// Zip timestamps with actual and predicted values, then score them.
    ///
    /// All three sequences must have the same length; nothing is padded.
    pub fn from_parts(
        segment: SegmentKind,
        horizon: usize,
        timestamps: &[NaiveDateTime],
        actual: &[f64],
        predicted: &[f64],
    ) -> Result<Self> {
        let context = format!("{segment} horizon {horizon}");
        if actual.len() != timestamps.len() {
            return Err(PipelineError::alignment(
                format!("{context} actual values"),
                timestamps.len(),
                actual.len(),
            ));
        }
        if predicted.len() != timestamps.len() {
            return Err(PipelineError::alignment(
                format!("{context} predictions"),
                timestamps.len(),
                predicted.len(),
            ));
        }

        let metrics = ForecastMetrics::calculate(actual, predicted)?;
        let records = timestamps
            .iter()
            .zip(actual.iter().zip(predicted.iter()))
            .map(|(timestamp, (actual, predicted))| PredictionRecord {
                timestamp: *timestamp,
                actual: *actual,
                predicted: *predicted,
            })
            .collect();

        Ok(Self {
            segment,
            horizon,
            records,
            metrics,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn stamps(n: usize) -> Vec<NaiveDateTime> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n)
            .map(|i| start + chrono::Duration::hours(i as i64))
            .collect()
    }

    #[test]
    fn test_from_parts_builds_records() {
        let forecast = HorizonForecast::from_parts(
            SegmentKind::Test,
            2,
            &stamps(2),
            &[10.0, 20.0],
            &[12.0, 18.0],
        )
        .unwrap();

        assert_eq!(forecast.len(), 2);
        assert_eq!(forecast.records[1].actual, 20.0);
        assert_eq!(forecast.records[1].predicted, 18.0);
        assert!((forecast.metrics.mae - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_short_predictions_are_not_padded() {
        let result = HorizonForecast::from_parts(
            SegmentKind::Test,
            1,
            &stamps(3),
            &[1.0, 2.0, 3.0],
            &[1.0, 2.0],
        );
        match result {
            Err(PipelineError::Alignment {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
            other => panic!("expected alignment error, got {other:?}"),
        }
    }
}
