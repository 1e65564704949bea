//! Result files
//!
//! Every file is named `<file_stem>_<suffix>` inside the output directory and
//! is overwritten on each run:
//! - `<stem>_predictions.csv`: `segment,horizon,timestamp,actual,predicted`
//! - `<stem>_metrics.csv`: one row per (segment, horizon)
//! - `<stem>_scalers.json`, `<stem>_summary.json`
//! - `<stem>_<segment>_h<horizon>_{inputs,targets}.npy`
//! - `<stem>_predictions.parquet` (feature `parquet`)
//! - `<stem>_predictions.xlsx` (feature `xlsx`)

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use ndarray_npy::WriteNpyExt;
use serde::Serialize;
use tracing::info;

use crate::config::ExportConfig;
use crate::domain::{HorizonForecast, SegmentKind};
use crate::error::{PipelineError, Result};
use crate::sequence::WindowedDataset;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One line of the predictions file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRow {
    pub segment: SegmentKind,
    pub horizon: usize,
    pub timestamp: String,
    pub actual: f64,
    pub predicted: f64,
}

/// One line of the metrics file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsRow {
    pub segment: SegmentKind,
    pub horizon: usize,
    pub samples: usize,
    pub r2: f64,
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub mbe: f64,
    pub rrmse: Option<f64>,
    pub rmbe: Option<f64>,
    pub max_error: f64,
}

impl From<&HorizonForecast> for MetricsRow {
    fn from(forecast: &HorizonForecast) -> Self {
        let m = &forecast.metrics;
        Self {
            segment: forecast.segment,
            horizon: forecast.horizon,
            samples: m.sample_count,
            r2: m.r2,
            mae: m.mae,
            mse: m.mse,
            rmse: m.rmse,
            mbe: m.mbe,
            rrmse: m.rrmse,
            rmbe: m.rmbe,
            max_error: m.max_error,
        }
    }
}

/// Every forecast must carry exactly as many records as its metrics counted
fn check_forecast(forecast: &HorizonForecast) -> Result<()> {
    if forecast.records.len() != forecast.metrics.sample_count {
        return Err(PipelineError::alignment(
            format!("{} horizon {} records", forecast.segment, forecast.horizon),
            forecast.metrics.sample_count,
            forecast.records.len(),
        ));
    }
    Ok(())
}

/// Flatten forecasts into the long prediction layout, in input order
pub fn prediction_rows(forecasts: &[HorizonForecast]) -> Result<Vec<PredictionRow>> {
    let mut rows = Vec::with_capacity(forecasts.iter().map(HorizonForecast::len).sum());
    for forecast in forecasts {
        check_forecast(forecast)?;
        rows.extend(forecast.records.iter().map(|r| PredictionRow {
            segment: forecast.segment,
            horizon: forecast.horizon,
            timestamp: r.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            actual: r.actual,
            predicted: r.predicted,
        }));
    }
    Ok(rows)
}

/// Writes the result files of one run
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
    file_stem: String,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>, file_stem: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            file_stem: file_stem.into(),
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(&config.output_dir, &config.file_stem)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<output_dir>/<file_stem>_<suffix>`
    pub fn path(&self, suffix: &str) -> PathBuf {
        self.output_dir.join(format!("{}_{}", self.file_stem, suffix))
    }

    fn create_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    fn write_csv<T: Serialize>(&self, suffix: &str, rows: &[T]) -> Result<PathBuf> {
        self.create_dir()?;
        let path = self.path(suffix);
        let mut writer = csv::Writer::from_path(&path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        info!(path = %path.display(), rows = rows.len(), "wrote csv");
        Ok(path)
    }

    pub fn write_predictions(&self, forecasts: &[HorizonForecast]) -> Result<PathBuf> {
        let rows = prediction_rows(forecasts)?;
        self.write_csv("predictions.csv", &rows)
    }

    pub fn write_metrics(&self, forecasts: &[HorizonForecast]) -> Result<PathBuf> {
        let rows = forecasts
            .iter()
            .map(|f| check_forecast(f).map(|_| MetricsRow::from(f)))
            .collect::<Result<Vec<_>>>()?;
        self.write_csv("metrics.csv", &rows)
    }

    /// Pretty-printed JSON, e.g. `write_json("scalers.json", &scalers)`
    pub fn write_json<T: Serialize + ?Sized>(&self, suffix: &str, value: &T) -> Result<PathBuf> {
        self.create_dir()?;
        let path = self.path(suffix);
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, value)?;
        info!(path = %path.display(), "wrote json");
        Ok(path)
    }

    /// Inputs and targets of one windowed segment as `.npy`
    pub fn write_tensors(
        &self,
        segment: SegmentKind,
        dataset: &WindowedDataset,
    ) -> Result<Vec<PathBuf>> {
        let windows = dataset.inputs.len_of(ndarray::Axis(0));
        if windows != dataset.targets.len() {
            return Err(PipelineError::alignment(
                format!("{segment} tensors"),
                windows,
                dataset.targets.len(),
            ));
        }
        self.create_dir()?;

        let prefix = format!("{segment}_h{}", dataset.horizon);
        let inputs_path = self.path(&format!("{prefix}_inputs.npy"));
        dataset
            .inputs
            .write_npy(BufWriter::new(File::create(&inputs_path)?))?;
        let targets_path = self.path(&format!("{prefix}_targets.npy"));
        dataset
            .targets
            .write_npy(BufWriter::new(File::create(&targets_path)?))?;

        info!(
            inputs = %inputs_path.display(),
            targets = %targets_path.display(),
            windows,
            "wrote tensors"
        );
        Ok(vec![inputs_path, targets_path])
    }

    #[cfg(feature = "parquet")]
    pub fn write_parquet(&self, forecasts: &[HorizonForecast]) -> Result<PathBuf> {
        use polars::prelude::*;

        let rows = prediction_rows(forecasts)?;
        let segment: Vec<String> = rows.iter().map(|r| r.segment.to_string()).collect();
        let horizon: Vec<u32> = rows.iter().map(|r| r.horizon as u32).collect();
        let timestamp: Vec<&str> = rows.iter().map(|r| r.timestamp.as_str()).collect();
        let actual: Vec<f64> = rows.iter().map(|r| r.actual).collect();
        let predicted: Vec<f64> = rows.iter().map(|r| r.predicted).collect();

        let mut df = DataFrame::new(vec![
            Series::new("segment", segment),
            Series::new("horizon", horizon),
            Series::new("timestamp", timestamp),
            Series::new("actual", actual),
            Series::new("predicted", predicted),
        ])?;

        self.create_dir()?;
        let path = self.path("predictions.parquet");
        ParquetWriter::new(File::create(&path)?).finish(&mut df)?;
        info!(path = %path.display(), rows = rows.len(), "wrote parquet");
        Ok(path)
    }

    /// The long prediction table as a single-sheet workbook
    #[cfg(feature = "xlsx")]
    pub fn write_xlsx(&self, forecasts: &[HorizonForecast]) -> Result<PathBuf> {
        use rust_xlsxwriter::Workbook;

        let rows = prediction_rows(forecasts)?;
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("predictions")?;
        for (col, name) in ["segment", "horizon", "timestamp", "actual", "predicted"]
            .iter()
            .enumerate()
        {
            sheet.write_string(0, col as u16, *name)?;
        }
        for (i, row) in rows.iter().enumerate() {
            let r = i as u32 + 1;
            sheet.write_string(r, 0, row.segment.to_string())?;
            sheet.write_number(r, 1, row.horizon as f64)?;
            sheet.write_string(r, 2, &row.timestamp)?;
            sheet.write_number(r, 3, row.actual)?;
            sheet.write_number(r, 4, row.predicted)?;
        }

        self.create_dir()?;
        let path = self.path("predictions.xlsx");
        workbook.save(&path)?;
        info!(path = %path.display(), rows = rows.len(), "wrote xlsx");
        Ok(path)
    }
}
