//! GHI forecast data pipeline
//!
//! Loads a solar irradiance series from CSV, splits it into contiguous
//! segments, robust-scales every segment with train statistics, windows the
//! scaled series into model-ready tensors and scores forecasts per horizon.
//!
//! ```no_run
//! use ghi_forecast::{config::Config, pipeline::Pipeline};
//!
//! let config = Config::load(None)?;
//! let report = Pipeline::new(config).run()?;
//! for row in &report.metrics {
//!     println!("{} h{}: rmse {:.2}", row.segment, row.horizon, row.rmse);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod ingest;
pub mod ml;
pub mod pipeline;
pub mod preprocessing;
pub mod sequence;
pub mod telemetry;

pub use error::{PipelineError, Result};
