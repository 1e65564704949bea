//! End-to-end run
//!
//! ```text
//! load -> calendar -> split -> window length checks -> fit scalers (train only) -> transform
//!      -> per horizon: window -> train -> predict -> inverse-scale
//!      -> metrics -> export
//! ```
//!
//! Everything is synchronous and single-threaded. The only state shared
//! between stages is the fitted scaler pair, passed by reference.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use ndarray::s;
use serde::Serialize;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::{HorizonForecast, Schema, Segment, SegmentKind, TimeSeriesTable};
use crate::error::{ConfigError, Result};
use crate::forecast::{Exporter, ForecastMetrics, MetricsRow};
use crate::ingest::{add_calendar_features, load_table};
use crate::ml::{build_forecaster, predict_windows, ModelMetadata};
use crate::preprocessing::{split, ScalerState};
use crate::sequence::{WindowedDataset, Windower};

/// Separate scaler states for the feature columns and the target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FittedScalers {
    pub features: ScalerState,
    pub target: ScalerState,
}

impl FittedScalers {
    pub fn fit(train: &Segment) -> Result<Self> {
        let schema = train.table.schema();
        Ok(Self {
            features: ScalerState::fit(train, schema.features())?,
            target: ScalerState::fit(train, &[schema.target()])?,
        })
    }

    pub fn transform(&self, segment: &Segment) -> Result<Segment> {
        let features = self.features.transform(segment)?;
        self.target.transform(&features)
    }

    /// Target values back in physical units
    pub fn inverse_target(&self, column: &str, values: &[f64]) -> Result<Vec<f64>> {
        self.target.inverse_transform(column, values)
    }
}

/// Scaled segments ready for windowing
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub schema: Schema,
    /// Unscaled segments in table order
    pub segments: Vec<Segment>,
    /// Same segments after scaling with the train statistics
    pub scaled: Vec<Segment>,
    pub scalers: FittedScalers,
}

impl PreparedData {
    /// Unscaled segment of the given kind
    pub fn raw_segment(&self, kind: SegmentKind) -> Result<&Segment> {
        self.segments
            .iter()
            .find(|s| s.kind == kind)
            .ok_or_else(|| ConfigError::Invalid(format!("no {kind} segment in this split")).into())
    }

    pub fn scaled_segment(&self, kind: SegmentKind) -> Option<&Segment> {
        self.scaled.iter().find(|s| s.kind == kind)
    }

    pub fn train(&self) -> Result<&Segment> {
        self.scaled_segment(SegmentKind::Train)
            .ok_or_else(|| ConfigError::Invalid("split produced no train segment".to_string()).into())
    }

    /// Every segment except train, in table order
    pub fn evaluation_segments(&self) -> impl Iterator<Item = &Segment> {
        self.scaled.iter().filter(|s| s.kind != SegmentKind::Train)
    }

    /// Window one scaled segment
    pub fn window(&self, kind: SegmentKind, windower: &Windower) -> Result<WindowedDataset> {
        let segment = self.scaled_segment(kind).ok_or_else(|| {
            ConfigError::Invalid(format!("no {kind} segment in this split"))
        })?;
        windower.apply(&segment.table, self.schema.target())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentSummary {
    pub kind: SegmentKind,
    pub offset: usize,
    pub rows: usize,
}

/// Outcome of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows: usize,
    pub columns: Vec<String>,
    pub segments: Vec<SegmentSummary>,
    /// One trained model per horizon
    pub models: Vec<ModelMetadata>,
    #[serde(skip)]
    pub forecasts: Vec<HorizonForecast>,
    pub metrics: Vec<MetricsRow>,
    pub outputs: Vec<PathBuf>,
}

impl RunReport {
    pub fn forecast(&self, segment: SegmentKind, horizon: usize) -> Option<&HorizonForecast> {
        self.forecasts
            .iter()
            .find(|f| f.segment == segment && f.horizon == horizon)
    }

    pub fn metrics_for(&self, segment: SegmentKind, horizon: usize) -> Option<&ForecastMetrics> {
        self.forecast(segment, horizon).map(|f| &f.metrics)
    }
}

pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read the configured CSV and append calendar columns
    pub fn load(&self) -> Result<TimeSeriesTable> {
        let _span = info_span!("load", path = %self.config.data.path.display()).entered();
        let table = load_table(&self.config.data)?;
        let table = add_calendar_features(table, &self.config.data.calendar_features)?;
        info!(
            rows = table.len(),
            columns = table.schema().len(),
            "table loaded"
        );
        Ok(table)
    }

    /// Load, split and scale; stops before windowing
    pub fn prepare(&self) -> Result<PreparedData> {
        let table = self.load()?;
        self.prepare_table(table)
    }

    pub fn prepare_table(&self, table: TimeSeriesTable) -> Result<PreparedData> {
        let segments = {
            let _span = info_span!("split").entered();
            let ratios = self.config.split.split_ratios()?;
            let segments = split(&table, &ratios)?;
            for s in &segments {
                info!(segment = %s.kind, offset = s.offset, rows = s.len(), "segment");
            }
            segments
        };
        self.check_window_lengths(&segments)?;

        let _span = info_span!("scale").entered();
        let train = segments
            .iter()
            .find(|s| s.kind == SegmentKind::Train)
            .ok_or_else(|| ConfigError::Invalid("split produced no train segment".to_string()))?;
        let scalers = FittedScalers::fit(train)?;
        let scaled = segments
            .iter()
            .map(|s| scalers.transform(s))
            .collect::<Result<Vec<_>>>()?;
        info!(
            feature_columns = scalers.features.columns().len(),
            fitted_rows = scalers.target.fitted_rows(),
            "scalers fitted on train segment"
        );

        Ok(PreparedData {
            schema: table.schema().clone(),
            segments,
            scaled,
            scalers,
        })
    }

    /// Every (segment, horizon) pair must fit at least one window
    fn check_window_lengths(&self, segments: &[Segment]) -> Result<()> {
        let window = &self.config.window;
        for &horizon in &window.horizons {
            let windower = Windower::new(window.time_steps, horizon)?;
            for segment in segments {
                if let Err(e) = windower.check_length(segment.len()) {
                    warn!(segment = %segment.kind, horizon, rows = segment.len(), "segment too short for one window");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Full run from the configured CSV
    pub fn run(&self) -> Result<RunReport> {
        let table = self.load()?;
        self.run_table(table)
    }

    /// Full run on an already loaded table (calendar columns included)
    pub fn run_table(&self, table: TimeSeriesTable) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let _run = info_span!("run", %run_id).entered();

        let rows = table.len();
        let prepared = self.prepare_table(table)?;
        let exporter = Exporter::from_config(&self.config.export);
        let mut outputs = Vec::new();
        let mut models = Vec::new();
        let mut forecasts = Vec::new();

        for &horizon in &self.config.window.horizons {
            let _span = info_span!("horizon", horizon).entered();
            let (model, mut horizon_forecasts, files) =
                self.forecast_horizon(&prepared, horizon, &exporter)?;
            models.push(model);
            forecasts.append(&mut horizon_forecasts);
            outputs.extend(files);
        }

        let metrics: Vec<MetricsRow> = forecasts.iter().map(MetricsRow::from).collect();
        let mut report = RunReport {
            run_id,
            started_at,
            finished_at: started_at,
            rows,
            columns: prepared.schema.columns().to_vec(),
            segments: prepared
                .segments
                .iter()
                .map(|s| SegmentSummary {
                    kind: s.kind,
                    offset: s.offset,
                    rows: s.len(),
                })
                .collect(),
            models,
            forecasts,
            metrics,
            outputs,
        };

        {
            let _span = info_span!("export", dir = %exporter.output_dir().display()).entered();
            let export = &self.config.export;
            report.outputs.push(exporter.write_predictions(&report.forecasts)?);
            report.outputs.push(exporter.write_metrics(&report.forecasts)?);
            if export.write_scalers {
                report
                    .outputs
                    .push(exporter.write_json("scalers.json", &prepared.scalers)?);
            }
            #[cfg(feature = "parquet")]
            if export.parquet {
                report.outputs.push(exporter.write_parquet(&report.forecasts)?);
            }
            #[cfg(feature = "xlsx")]
            if export.xlsx {
                report.outputs.push(exporter.write_xlsx(&report.forecasts)?);
            }
            report.finished_at = Utc::now();
            if export.write_summary {
                let path = exporter.path("summary.json");
                report.outputs.push(path);
                exporter.write_json("summary.json", &report)?;
            }
        }

        info!(
            forecasts = report.forecasts.len(),
            files = report.outputs.len(),
            "run complete"
        );
        Ok(report)
    }

    /// Train one model for `horizon` and evaluate it on every non-train segment
    fn forecast_horizon(
        &self,
        prepared: &PreparedData,
        horizon: usize,
        exporter: &Exporter,
    ) -> Result<(ModelMetadata, Vec<HorizonForecast>, Vec<PathBuf>)> {
        let window = &self.config.window;
        let windower = Windower::new(window.time_steps, horizon)?.include_target(window.include_target);
        let target = prepared.schema.target();
        let mut files = Vec::new();

        let train = windower.apply(&prepared.train()?.table, target)?;
        if self.config.export.write_tensors {
            files.extend(exporter.write_tensors(SegmentKind::Train, &train)?);
        }

        let forecaster = build_forecaster(&self.config.model, train.target_input_index())?;
        let model = forecaster.train(train.inputs.view(), train.targets.view())?;
        info!(
            model = forecaster.name(),
            windows = train.len(),
            train_r2 = model.metadata().training_metrics.r2,
            "model trained"
        );

        let mut forecasts = Vec::new();
        for segment in prepared.evaluation_segments() {
            let dataset = windower.apply(&segment.table, target)?;
            if self.config.export.write_tensors {
                files.extend(exporter.write_tensors(segment.kind, &dataset)?);
            }

            let predicted = predict_windows(model.as_ref(), dataset.inputs.view())?;
            let predicted = prepared.scalers.inverse_target(target, &predicted.to_vec())?;
            // actuals come straight from the unscaled rows
            let raw = prepared.raw_segment(segment.kind)?;
            let actual = raw
                .table
                .target()
                .slice(s![windower.target_rows(raw.len())])
                .to_vec();

            let forecast = HorizonForecast::from_parts(
                segment.kind,
                horizon,
                &dataset.target_timestamps,
                &actual,
                &predicted,
            )?;
            info!(segment = %segment.kind, horizon, metrics = %forecast.metrics, "evaluated");
            if forecast.metrics.r2 < 0.0 {
                warn!(segment = %segment.kind, horizon, r2 = forecast.metrics.r2, "model is worse than the mean");
            }
            forecasts.push(forecast);
        }

        Ok((model.metadata().clone(), forecasts, files))
    }
}
