use std::path::Path;

use anyhow::{Context, Result};
use ghi_forecast::{config::Config, pipeline::Pipeline, telemetry};
use tracing::info;

fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let config_path = std::env::args().nth(1);
    let cfg = Config::load(config_path.as_deref().map(Path::new))?;
    info!(
        data = %cfg.data.path.display(),
        model = %cfg.model.kind,
        horizons = ?cfg.window.horizons,
        "starting GHI forecast pipeline"
    );

    let report = Pipeline::new(cfg)
        .run()
        .context("pipeline run failed")?;

    for row in &report.metrics {
        info!(
            segment = %row.segment,
            horizon = row.horizon,
            samples = row.samples,
            r2 = row.r2,
            rmse = row.rmse,
            mae = row.mae,
            mbe = row.mbe,
            "forecast metrics"
        );
    }
    info!(run_id = %report.run_id, files = report.outputs.len(), "done");
    Ok(())
}
