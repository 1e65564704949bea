//! Robust (median / IQR) scaling
//!
//! The state is fitted once on the training segment and then applied,
//! read-only, to every segment. Feature columns and the target column get
//! separate states so predictions can be mapped back to W/m² with the target
//! statistics alone.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{Segment, SegmentKind, TimeSeriesTable};
use crate::error::{ConfigError, Result, SchemaError};

/// IQR at or below this is treated as zero
const MIN_IQR: f64 = 1e-12;

/// Fitted statistics of one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnScale {
    pub column: String,
    pub median: f64,
    /// 25th percentile
    pub q1: f64,
    /// 75th percentile
    pub q3: f64,
    pub iqr: f64,
    /// Divisor actually used; 1.0 when the IQR is zero
    pub scale: f64,
    /// Zero IQR, the column is only centred
    pub degenerate: bool,
}

impl ColumnScale {
    fn fit(column: &str, values: impl Iterator<Item = f64>) -> Result<Self> {
        let mut sorted: Vec<f64> = values.collect();
        if sorted.is_empty() {
            return Err(SchemaError::EmptyTable.into());
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        let median = percentile(&sorted, 0.5);
        let q1 = percentile(&sorted, 0.25);
        let q3 = percentile(&sorted, 0.75);
        let iqr = q3 - q1;
        let degenerate = iqr.abs() <= MIN_IQR;
        if degenerate {
            warn!(column, median, "zero interquartile range; column is centred but not scaled");
        }

        Ok(Self {
            column: column.to_string(),
            median,
            q1,
            q3,
            iqr,
            scale: if degenerate { 1.0 } else { iqr },
            degenerate,
        })
    }

    pub fn apply(&self, value: f64) -> f64 {
        (value - self.median) / self.scale
    }

    pub fn invert(&self, value: f64) -> f64 {
        value * self.scale + self.median
    }
}

/// Percentile of pre-sorted data, linear interpolation between closest ranks
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Immutable robust-scaler state for a set of columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    columns: Vec<ColumnScale>,
    fitted_rows: usize,
}

impl ScalerState {
    /// Fit per-column statistics on the training segment.
    ///
    /// Any other segment kind is refused so test or validation data can never
    /// leak into the statistics.
    pub fn fit<S: AsRef<str>>(segment: &Segment, columns: &[S]) -> Result<Self> {
        if segment.kind != SegmentKind::Train {
            return Err(ConfigError::Invalid(format!(
                "scaler must be fitted on the train segment, got {}",
                segment.kind
            ))
            .into());
        }

        let table = &segment.table;
        let columns = columns
            .iter()
            .map(|name| {
                let name = name.as_ref();
                let values = table.column(name)?;
                ColumnScale::fit(name, values.iter().copied())
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            columns = columns.len(),
            rows = table.len(),
            "fitted robust scaler"
        );
        Ok(Self {
            columns,
            fitted_rows: table.len(),
        })
    }

    pub fn columns(&self) -> &[ColumnScale] {
        &self.columns
    }

    pub fn fitted_rows(&self) -> usize {
        self.fitted_rows
    }

    pub fn get(&self, column: &str) -> Option<&ColumnScale> {
        self.columns.iter().find(|c| c.column == column)
    }

    fn require(&self, column: &str) -> Result<&ColumnScale> {
        self.get(column)
            .ok_or_else(|| ConfigError::UnscaledColumn(column.to_string()).into())
    }

    /// Scale every covered column of `segment`; other columns are copied as is
    pub fn transform(&self, segment: &Segment) -> Result<Segment> {
        Ok(Segment {
            kind: segment.kind,
            offset: segment.offset,
            table: self.transform_table(&segment.table)?,
        })
    }

    pub fn transform_table(&self, table: &TimeSeriesTable) -> Result<TimeSeriesTable> {
        self.map_table(table, ColumnScale::apply)
    }

    /// Undo [`transform_table`](Self::transform_table)
    pub fn inverse_transform_table(&self, table: &TimeSeriesTable) -> Result<TimeSeriesTable> {
        self.map_table(table, ColumnScale::invert)
    }

    fn map_table(
        &self,
        table: &TimeSeriesTable,
        f: fn(&ColumnScale, f64) -> f64,
    ) -> Result<TimeSeriesTable> {
        let mut values: Array2<f64> = table.values().to_owned();
        for scale in &self.columns {
            let idx = table.schema().require(&scale.column)?;
            values.column_mut(idx).mapv_inplace(|v| f(scale, v));
        }
        table.with_values(values)
    }

    /// Map scaled values of `column` back to original units
    pub fn inverse_transform(&self, column: &str, values: &[f64]) -> Result<Vec<f64>> {
        let scale = self.require(column)?;
        Ok(values.iter().map(|v| scale.invert(*v)).collect())
    }

    pub fn transform_values(&self, column: &str, values: &[f64]) -> Result<Vec<f64>> {
        let scale = self.require(column)?;
        Ok(values.iter().map(|v| scale.apply(*v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Schema;
    use crate::error::PipelineError;
    use chrono::NaiveDate;
    use ndarray::Array2;
    use proptest::prelude::*;

    fn segment(kind: SegmentKind, target: &[f64], feature: &[f64]) -> Segment {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let rows = target.len();
        let timestamps = (0..rows)
            .map(|i| start + chrono::Duration::hours(i as i64))
            .collect();
        let values =
            Array2::from_shape_fn((rows, 2), |(r, c)| if c == 0 { target[r] } else { feature[r] });
        let schema = Schema::new("ghi", &["aod".to_string()]).unwrap();
        Segment {
            kind,
            offset: 0,
            table: TimeSeriesTable::new(schema, timestamps, values).unwrap(),
        }
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 0.5), 3.0);
        assert_eq!(percentile(&sorted, 0.25), 2.0);
        assert_eq!(percentile(&sorted, 0.75), 4.0);

        let even = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&even, 0.5), 2.5);
        assert_eq!(percentile(&even, 0.25), 1.75);
        assert_eq!(percentile(&even, 0.75), 3.25);
    }

    #[test]
    fn test_fit_statistics() {
        let train = segment(
            SegmentKind::Train,
            &[1.0, 2.0, 3.0, 4.0, 5.0],
            &[10.0, 20.0, 30.0, 40.0, 50.0],
        );
        let state = ScalerState::fit(&train, &["ghi", "aod"]).unwrap();

        let ghi = state.get("ghi").unwrap();
        assert_eq!((ghi.median, ghi.iqr, ghi.scale), (3.0, 2.0, 2.0));
        let aod = state.get("aod").unwrap();
        assert_eq!((aod.median, aod.iqr), (30.0, 20.0));
        assert_eq!(state.fitted_rows(), 5);
    }

    #[test]
    fn test_transform_covers_only_fitted_columns() {
        let train = segment(SegmentKind::Train, &[1.0, 2.0, 3.0, 4.0, 5.0], &[7.0; 5]);
        let target_state = ScalerState::fit(&train, &["ghi"]).unwrap();
        let scaled = target_state.transform(&train).unwrap();

        assert_eq!(
            scaled.table.target().to_vec(),
            vec![-1.0, -0.5, 0.0, 0.5, 1.0]
        );
        assert_eq!(scaled.table.column("aod").unwrap().to_vec(), vec![7.0; 5]);
    }

    #[test]
    fn test_test_segment_uses_train_statistics() {
        let train = segment(SegmentKind::Train, &[1.0, 2.0, 3.0, 4.0, 5.0], &[0.0; 5]);
        let state = ScalerState::fit(&train, &["ghi"]).unwrap();

        let test_a = segment(SegmentKind::Test, &[3.0, 7.0], &[0.0; 2]);
        let test_b = segment(SegmentKind::Test, &[3.0, 1000.0], &[0.0; 2]);
        let a = state.transform(&test_a).unwrap();
        let b = state.transform(&test_b).unwrap();

        // (3 - 3) / 2 and (7 - 3) / 2: only the train median and IQR matter
        assert_eq!(a.table.target().to_vec(), vec![0.0, 2.0]);
        assert_eq!(b.table.target()[0], a.table.target()[0]);
        assert_eq!(b.table.target()[1], (1000.0 - 3.0) / 2.0);
    }

    #[test]
    fn test_fit_refuses_non_train_segment() {
        let test = segment(SegmentKind::Test, &[1.0, 2.0], &[1.0, 2.0]);
        assert!(matches!(
            ScalerState::fit(&test, &["ghi"]),
            Err(PipelineError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn test_zero_iqr_falls_back_to_centering() {
        // Night-time zeros dominate: IQR of a constant column is 0
        let train = segment(SegmentKind::Train, &[0.0, 0.0, 0.0, 0.0, 0.0], &[1.0; 5]);
        let state = ScalerState::fit(&train, &["ghi"]).unwrap();
        let ghi = state.get("ghi").unwrap();
        assert!(ghi.degenerate);
        assert_eq!(ghi.scale, 1.0);

        let scaled = state.transform_values("ghi", &[5.0, -2.0]).unwrap();
        assert_eq!(scaled, vec![5.0, -2.0]);
        assert!(scaled.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_unknown_column() {
        let train = segment(SegmentKind::Train, &[1.0, 2.0], &[1.0, 2.0]);
        let state = ScalerState::fit(&train, &["ghi"]).unwrap();
        assert!(matches!(
            state.inverse_transform("aod", &[1.0]),
            Err(PipelineError::Config(ConfigError::UnscaledColumn(_)))
        ));
        assert!(ScalerState::fit(&train, &["water"]).is_err());
    }

    #[test]
    fn test_table_round_trip() {
        let train = segment(SegmentKind::Train, &[1.0, 5.0, 9.0, 2.0], &[0.5, 0.1, 0.9, 0.3]);
        let state = ScalerState::fit(&train, &["ghi", "aod"]).unwrap();
        let scaled = state.transform_table(&train.table).unwrap();
        let restored = state.inverse_transform_table(&scaled).unwrap();
        for (a, b) in restored.values().iter().zip(train.table.values().iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    proptest! {
        #[test]
        fn prop_inverse_undoes_transform(
            train in proptest::collection::vec(-1_000.0f64..1_000.0, 4..64),
            probe in proptest::collection::vec(-5_000.0f64..5_000.0, 1..32),
        ) {
            let seg = segment(SegmentKind::Train, &train, &train);
            let state = ScalerState::fit(&seg, &["ghi"]).unwrap();
            prop_assume!(!state.get("ghi").unwrap().degenerate);

            let scaled = state.transform_values("ghi", &probe).unwrap();
            let restored = state.inverse_transform("ghi", &scaled).unwrap();
            for (orig, back) in probe.iter().zip(restored.iter()) {
                prop_assert!((orig - back).abs() <= 1e-9 * orig.abs().max(1.0));
            }
        }
    }
}
