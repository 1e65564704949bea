use chrono::NaiveDateTime;
use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::{PipelineError, Result, SchemaError};

// ============================================================================
// Schema
// ============================================================================

/// Ordered list of the numeric columns of a table.
///
/// The target column always sits at index 0, followed by the feature columns
/// in the order they were declared (raw features first, derived ones after).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    pub fn new(target: impl Into<String>, features: &[String]) -> Result<Self> {
        let mut schema = Self {
            columns: vec![target.into()],
        };
        for feature in features {
            schema = schema.with_column(feature)?;
        }
        Ok(schema)
    }

    /// Schema with one more column appended
    pub fn with_column(&self, name: &str) -> Result<Self> {
        if self.columns.iter().any(|c| c == name) {
            return Err(SchemaError::DuplicateColumn(name.to_string()).into());
        }
        let mut columns = self.columns.clone();
        columns.push(name.to_string());
        Ok(Self { columns })
    }

    pub fn target(&self) -> &str {
        &self.columns[0]
    }

    pub fn target_index(&self) -> usize {
        0
    }

    pub fn features(&self) -> &[String] {
        &self.columns[1..]
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name).ok_or_else(|| {
            SchemaError::MissingColumn {
                column: name.to_string(),
                available: self.columns.join(", "),
            }
            .into()
        })
    }
}

// ============================================================================
// TimeSeriesTable
// ============================================================================

/// Time-indexed numeric table, one row per timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesTable {
    schema: Schema,
    timestamps: Vec<NaiveDateTime>,
    values: Array2<f64>,
}

impl TimeSeriesTable {
    pub fn new(schema: Schema, timestamps: Vec<NaiveDateTime>, values: Array2<f64>) -> Result<Self> {
        if values.nrows() != timestamps.len() {
            return Err(PipelineError::alignment(
                "table rows vs timestamps",
                timestamps.len(),
                values.nrows(),
            ));
        }
        if values.ncols() != schema.len() {
            return Err(PipelineError::alignment(
                "table columns vs schema",
                schema.len(),
                values.ncols(),
            ));
        }
        Ok(Self {
            schema,
            timestamps,
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let idx = self.schema.require(name)?;
        Ok(self.values.column(idx))
    }

    pub fn target(&self) -> ArrayView1<'_, f64> {
        self.values.column(self.schema.target_index())
    }

    /// Owned copy of rows `range`
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            schema: self.schema.clone(),
            timestamps: self.timestamps[range.clone()].to_vec(),
            values: self.values.slice(s![range, ..]).to_owned(),
        }
    }

    /// Append a column computed elsewhere (e.g. calendar features)
    pub fn with_column(self, name: &str, column: Vec<f64>) -> Result<Self> {
        if column.len() != self.len() {
            return Err(PipelineError::alignment(
                format!("new column '{name}'"),
                self.len(),
                column.len(),
            ));
        }
        let schema = self.schema.with_column(name)?;
        let column = Array2::from_shape_vec((column.len(), 1), column)?;
        let values = ndarray::concatenate(Axis(1), &[self.values.view(), column.view()])?;
        Self::new(schema, self.timestamps, values)
    }

    /// Same rows and schema, new values (shape must match)
    pub fn with_values(&self, values: Array2<f64>) -> Result<Self> {
        if values.dim() != self.values.dim() {
            return Err(PipelineError::alignment(
                "replacement values",
                self.values.len(),
                values.len(),
            ));
        }
        Ok(Self {
            schema: self.schema.clone(),
            timestamps: self.timestamps.clone(),
            values,
        })
    }

    /// True when every timestamp is strictly later than the previous one
    pub fn is_strictly_increasing(&self) -> bool {
        self.timestamps.windows(2).all(|w| w[0] < w[1])
    }
}

// ============================================================================
// Segment
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SegmentKind {
    Train,
    Test,
    Validation,
}

/// Contiguous slice of the source table, produced once by the splitter
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub kind: SegmentKind,
    /// First row of this segment in the source table
    pub offset: usize,
    pub table: TimeSeriesTable,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn rows(&self) -> Range<usize> {
        self.offset..self.offset + self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::array;

    fn ts(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn table() -> TimeSeriesTable {
        let schema = Schema::new("ghi", &["aod".to_string()]).unwrap();
        TimeSeriesTable::new(
            schema,
            vec![ts(0), ts(1), ts(2)],
            array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_schema_target_first() {
        let schema = Schema::new("ghi", &["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(schema.target(), "ghi");
        assert_eq!(schema.features(), &["a".to_string(), "b".to_string()]);
        assert_eq!(schema.index_of("b"), Some(2));
    }

    #[test]
    fn test_schema_rejects_duplicates() {
        let result = Schema::new("ghi", &["a".to_string(), "ghi".to_string()]);
        assert!(matches!(
            result,
            Err(PipelineError::Schema(SchemaError::DuplicateColumn(_)))
        ));
    }

    #[test]
    fn test_missing_column_lists_available() {
        let err = table().column("water").unwrap_err();
        assert!(err.to_string().contains("ghi, aod"));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let schema = Schema::new("ghi", &[]).unwrap();
        let result = TimeSeriesTable::new(schema, vec![ts(0)], array![[1.0], [2.0]]);
        assert!(matches!(result, Err(PipelineError::Alignment { .. })));
    }

    #[test]
    fn test_slice_keeps_order() {
        let sliced = table().slice(1..3);
        assert_eq!(sliced.len(), 2);
        assert_eq!(sliced.timestamps()[0], ts(1));
        assert_eq!(sliced.target().to_vec(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_with_column_appends() {
        let extended = table().with_column("hour", vec![0.0, 1.0, 2.0]).unwrap();
        assert_eq!(extended.schema().len(), 3);
        assert_eq!(extended.column("hour").unwrap().to_vec(), vec![0.0, 1.0, 2.0]);
        assert!(table().with_column("hour", vec![0.0]).is_err());
    }

    #[test]
    fn test_strictly_increasing() {
        assert!(table().is_strictly_increasing());
        let schema = Schema::new("ghi", &[]).unwrap();
        let dup = TimeSeriesTable::new(schema, vec![ts(1), ts(1)], array![[1.0], [2.0]]).unwrap();
        assert!(!dup.is_strictly_increasing());
    }
}
