//! Chronological train/test(/validation) split
//!
//! Segments are contiguous and keep the original row order; nothing is
//! shuffled across a boundary.

use tracing::debug;

use crate::domain::{Segment, SegmentKind, TimeSeriesTable};
use crate::error::{ConfigError, Result};

/// Slack on the ratio sum so that e.g. `[0.7, 0.2, 0.1]` is accepted
const SUM_TOLERANCE: f64 = 1e-9;

/// Split ratios, either a single train fraction or train/test(/validation)
#[derive(Debug, Clone, PartialEq)]
pub struct SplitRatios {
    ratios: Vec<f64>,
}

impl SplitRatios {
    /// Train on `fraction`, test on the rest
    pub fn train_fraction(fraction: f64) -> Result<Self> {
        Self::from_slice(&[fraction])
    }

    pub fn three_way(train: f64, test: f64, validation: f64) -> Result<Self> {
        Self::from_slice(&[train, test, validation])
    }

    pub fn from_slice(ratios: &[f64]) -> Result<Self> {
        let invalid = |reason: &str| ConfigError::InvalidRatios {
            ratios: ratios.to_vec(),
            reason: reason.to_string(),
        };

        if ratios.is_empty() || ratios.len() > 3 {
            return Err(invalid("expected 1 to 3 ratios").into());
        }
        if ratios.iter().any(|r| !r.is_finite() || *r <= 0.0 || *r > 1.0) {
            return Err(invalid("every ratio must be in (0, 1]").into());
        }
        if ratios.len() == 1 && ratios[0] >= 1.0 {
            return Err(invalid("a single train fraction must leave rows for testing").into());
        }
        if ratios.iter().sum::<f64>() > 1.0 + SUM_TOLERANCE {
            return Err(invalid("ratios sum to more than 1").into());
        }
        Ok(Self {
            ratios: ratios.to_vec(),
        })
    }

    pub fn segment_kinds(&self) -> &'static [SegmentKind] {
        if self.ratios.len() == 3 {
            &[SegmentKind::Train, SegmentKind::Test, SegmentKind::Validation]
        } else {
            &[SegmentKind::Train, SegmentKind::Test]
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.ratios
    }
}

/// Segment lengths for a table of `rows` rows.
///
/// Every segment but the last gets `floor(rows * ratio)`; the last one takes
/// whatever remains, so the lengths always sum to `rows`.
pub fn segment_lengths(rows: usize, ratios: &SplitRatios) -> Result<Vec<usize>> {
    let n_segments = ratios.segment_kinds().len();
    let mut lengths: Vec<i64> = ratios.ratios[..n_segments - 1]
        .iter()
        .map(|r| (rows as f64 * r).floor() as i64)
        .collect();
    let remainder = rows as i64 - lengths.iter().sum::<i64>();
    lengths.push(remainder);

    if let Some((segment, &length)) = lengths.iter().enumerate().find(|(_, l)| **l <= 0) {
        return Err(ConfigError::EmptySegment {
            rows,
            ratios: ratios.ratios.clone(),
            segment,
            length,
        }
        .into());
    }
    Ok(lengths.into_iter().map(|l| l as usize).collect())
}

/// Partition `table` into contiguous segments
pub fn split(table: &TimeSeriesTable, ratios: &SplitRatios) -> Result<Vec<Segment>> {
    let lengths = segment_lengths(table.len(), ratios)?;

    let mut offset = 0;
    let segments = ratios
        .segment_kinds()
        .iter()
        .zip(lengths)
        .map(|(&kind, len)| {
            let segment = Segment {
                kind,
                offset,
                table: table.slice(offset..offset + len),
            };
            debug!(%kind, offset, len, "split segment");
            offset += len;
            segment
        })
        .collect();
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Schema;
    use crate::error::PipelineError;
    use chrono::NaiveDate;
    use ndarray::Array2;
    use proptest::prelude::*;

    fn table(rows: usize) -> TimeSeriesTable {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let timestamps = (0..rows)
            .map(|i| start + chrono::Duration::hours(i as i64))
            .collect();
        let values = Array2::from_shape_fn((rows, 1), |(r, _)| r as f64);
        TimeSeriesTable::new(Schema::new("ghi", &[]).unwrap(), timestamps, values).unwrap()
    }

    #[test]
    fn test_three_way_split_sizes() {
        let ratios = SplitRatios::three_way(0.7, 0.15, 0.15).unwrap();
        let segments = split(&table(100), &ratios).unwrap();

        let lens: Vec<usize> = segments.iter().map(|s| s.len()).collect();
        assert_eq!(lens, vec![70, 15, 15]);
        assert_eq!(segments[2].kind, SegmentKind::Validation);
        assert_eq!(segments[1].offset, 70);
        assert_eq!(segments[2].offset, 85);
    }

    #[test]
    fn test_remainder_goes_to_last_segment() {
        let ratios = SplitRatios::three_way(0.7, 0.15, 0.15).unwrap();
        // 0.7*101 = 70.7, 0.15*101 = 15.15
        assert_eq!(segment_lengths(101, &ratios).unwrap(), vec![70, 15, 16]);
    }

    #[test]
    fn test_train_fraction_split() {
        let ratios = SplitRatios::train_fraction(0.9).unwrap();
        let segments = split(&table(25), &ratios).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].len(), 22);
        assert_eq!(segments[1].len(), 3);
        assert_eq!(segments[1].kind, SegmentKind::Test);
    }

    #[test]
    fn test_plain_floor_of_product() {
        // 100.0 * 0.29 is 28.999999999999996 in f64
        let ratios = SplitRatios::from_slice(&[0.29, 0.71]).unwrap();
        assert_eq!(segment_lengths(100, &ratios).unwrap(), vec![28, 72]);
    }

    #[test]
    fn test_order_is_preserved() {
        let ratios = SplitRatios::three_way(0.5, 0.25, 0.25).unwrap();
        let segments = split(&table(8), &ratios).unwrap();
        let rejoined: Vec<f64> = segments
            .iter()
            .flat_map(|s| s.table.target().to_vec())
            .collect();
        assert_eq!(rejoined, (0..8).map(|v| v as f64).collect::<Vec<_>>());
        assert_eq!(segments[1].rows(), 4..6);
    }

    #[test]
    fn test_empty_segment_is_config_error() {
        let ratios = SplitRatios::three_way(0.7, 0.15, 0.15).unwrap();
        let err = split(&table(5), &ratios).unwrap_err();
        // floor(0.75) = 0 test rows
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::EmptySegment { segment: 1, length: 0, .. })
        ));
    }

    #[test]
    fn test_full_ratio_sum_leaves_no_gap() {
        // a ratio sum below 1 still hands the remainder to the last segment
        let ratios = SplitRatios::three_way(0.6, 0.2, 0.1).unwrap();
        assert_eq!(segment_lengths(10, &ratios).unwrap(), vec![6, 2, 2]);
    }

    #[test]
    fn test_invalid_ratios() {
        assert!(SplitRatios::from_slice(&[]).is_err());
        assert!(SplitRatios::from_slice(&[1.0]).is_err());
        assert!(SplitRatios::from_slice(&[0.0, 0.5]).is_err());
        assert!(SplitRatios::from_slice(&[0.7, 0.4]).is_err());
        assert!(SplitRatios::from_slice(&[f64::NAN]).is_err());
        assert!(SplitRatios::from_slice(&[0.25; 4]).is_err());
    }

    proptest! {
        #[test]
        fn prop_lengths_sum_to_rows(
            rows in 20usize..5_000,
            train in 0.05f64..0.8,
            test_share in 0.1f64..0.9,
        ) {
            let test = (1.0 - train) * test_share;
            let validation = 1.0 - train - test;
            prop_assume!(validation > 0.01);
            let ratios = SplitRatios::three_way(train, test, validation).unwrap();
            if let Ok(lengths) = segment_lengths(rows, &ratios) {
                prop_assert_eq!(lengths.iter().sum::<usize>(), rows);
                prop_assert!(lengths.iter().all(|l| *l > 0));
            }
        }
    }
}
