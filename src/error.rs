//! Pipeline error types
//!
//! Every stage returns [`PipelineError`]. The variants follow the failure
//! classes of the pipeline: schema problems in the input file, configuration
//! that cannot produce a valid split or window set, and misaligned
//! actual/predicted sequences. None of them is retried.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Top-level error returned by every pipeline stage
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Alignment error in {context}: expected {expected} values, got {actual}")]
    Alignment {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("Model error: {0}")]
    Model(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("NumPy export error: {0}")]
    Npy(#[from] ndarray_npy::WriteNpyError),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[cfg(feature = "parquet")]
    #[error("Parquet export error: {0}")]
    Parquet(#[from] polars::prelude::PolarsError),

    #[cfg(feature = "xlsx")]
    #[error("Spreadsheet export error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

impl PipelineError {
    pub fn alignment(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        PipelineError::Alignment {
            context: context.into(),
            expected,
            actual,
        }
    }
}

/// Problems with the shape or content of the input table
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("required column '{column}' not found (available: {available})")]
    MissingColumn { column: String, available: String },

    #[error("column '{0}' appears more than once")]
    DuplicateColumn(String),

    #[error("row {row}: cannot parse timestamp '{value}'")]
    InvalidTimestamp { row: usize, value: String },

    #[error("row {row}, column '{column}': cannot parse number '{value}'")]
    InvalidNumber {
        row: usize,
        column: String,
        value: String,
    },

    #[error("row {row}, column '{column}': missing value")]
    MissingValue { row: usize, column: String },

    #[error("row {row}: expected {expected} fields, found {found}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("table has no data rows")]
    EmptyTable,
}

/// Settings that cannot produce a valid split, scaler or window set
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid split ratios {ratios:?}: {reason}")]
    InvalidRatios { ratios: Vec<f64>, reason: String },

    #[error("split of {rows} rows with ratios {ratios:?} leaves segment {segment} with {length} rows")]
    EmptySegment {
        rows: usize,
        ratios: Vec<f64>,
        segment: usize,
        length: i64,
    },

    #[error("time_steps ({time_steps}) + horizon ({horizon}) exceeds segment length {length}; no windows can be built")]
    WindowTooLong {
        time_steps: usize,
        horizon: usize,
        length: usize,
    },

    #[error("{0} must be at least 1")]
    ZeroParameter(&'static str),

    #[error("column '{0}' is not covered by the scaler state")]
    UnscaledColumn(String),

    #[error("{0}")]
    Invalid(String),
}

/// Forecast metrics calculation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    #[error("Dimension mismatch: actual={actual}, predicted={predicted}")]
    DimensionMismatch { actual: usize, predicted: usize },

    #[error("Empty data provided")]
    EmptyData,
}
