//! Forecast evaluation and result export

pub mod export;
pub mod metrics;

pub use export::{prediction_rows, Exporter, MetricsRow, PredictionRow};
pub use metrics::ForecastMetrics;
