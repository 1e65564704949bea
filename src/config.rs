use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::ingest::{CalendarFeature, MissingValuePolicy};
use crate::ml::ForecasterKind;
use crate::preprocessing::SplitRatios;

const DEFAULT_CONFIG_FILE: &str = "config/default.toml";
const ENV_PREFIX: &str = "GHI__";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub data: DataConfig,
    #[validate(nested)]
    pub split: SplitConfig,
    #[validate(nested)]
    pub window: WindowConfig,
    #[validate(nested)]
    pub model: ModelConfig,
    #[validate(nested)]
    pub export: ExportConfig,
}

/// Input file and column selection
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DataConfig {
    pub path: PathBuf,
    #[validate(length(min = 1))]
    pub timestamp_column: String,
    /// chrono format string; when absent a fixed list of common layouts is tried
    pub timestamp_format: Option<String>,
    #[validate(length(min = 1))]
    pub target_column: String,
    pub feature_columns: Vec<String>,
    pub calendar_features: Vec<CalendarFeature>,
    pub missing_values: MissingValuePolicy,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/busan_dataset.csv"),
            timestamp_column: "Date".to_string(),
            timestamp_format: None,
            target_column: "GHI_Average".to_string(),
            feature_columns: [
                "SunZenith_KMU",
                "Ambient_Pressure",
                "Water",
                "AOD",
                "Uo (atm-cm)",
                "CI_Hammer",
                "OT",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            calendar_features: vec![CalendarFeature::Hour, CalendarFeature::Month],
            missing_values: MissingValuePolicy::Reject,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SplitConfig {
    /// One train fraction, or train/test(/validation) ratios in order
    #[validate(length(min = 1, max = 3))]
    pub ratios: Vec<f64>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            ratios: vec![0.7, 0.15, 0.15],
        }
    }
}

impl SplitConfig {
    pub fn split_ratios(&self) -> crate::Result<SplitRatios> {
        SplitRatios::from_slice(&self.ratios)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WindowConfig {
    #[validate(range(min = 1))]
    pub time_steps: usize,
    #[validate(length(min = 1))]
    pub horizons: Vec<usize>,
    /// Feed the (scaled) target column to the model as an input feature
    pub include_target: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            time_steps: 7,
            horizons: vec![1, 2, 3],
            include_target: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ModelConfig {
    pub kind: ForecasterKind,
    #[validate(range(min = 0.0))]
    pub ridge_alpha: f64,
    #[validate(range(min = 1))]
    pub n_trees: usize,
    pub max_depth: Option<u16>,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ForecasterKind::Ridge,
            ridge_alpha: 1.0,
            n_trees: 50,
            max_depth: Some(10),
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    #[validate(length(min = 1))]
    pub file_stem: String,
    pub write_scalers: bool,
    pub write_summary: bool,
    /// Windowed train/eval arrays as .npy for an external trainer
    pub write_tensors: bool,
    /// Requires the `parquet` feature
    pub parquet: bool,
    /// Prediction table as a spreadsheet; requires the `xlsx` feature
    pub xlsx: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            file_stem: "ghi".to_string(),
            write_scalers: true,
            write_summary: true,
            write_tensors: false,
            parquet: false,
            xlsx: false,
        }
    }
}

impl Config {
    /// Built-in defaults, then `config/default.toml`, then `extra_file`, then `GHI__*` env vars.
    pub fn load(extra_file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(DEFAULT_CONFIG_FILE));
        if let Some(path) = extra_file {
            if !path.exists() {
                anyhow::bail!("config file {} does not exist", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }
        let cfg: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("failed to extract configuration")?;
        cfg.check()?;
        Ok(cfg)
    }

    /// Parse a TOML document on top of the defaults (no env, no files).
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let cfg: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(toml))
            .extract()
            .context("failed to parse configuration")?;
        cfg.check()?;
        Ok(cfg)
    }

    /// Field rules plus the cross-field checks the derive cannot express
    pub fn check(&self) -> Result<()> {
        self.validate().context("invalid configuration")?;
        self.split.split_ratios().context("invalid [split] section")?;
        if self.window.horizons.iter().any(|h| *h == 0) {
            anyhow::bail!("window.horizons must all be at least 1");
        }
        if !self.window.include_target
            && self.data.feature_columns.is_empty()
            && self.data.calendar_features.is_empty()
        {
            anyhow::bail!("window.include_target = false leaves no input columns");
        }
        if self.data.feature_columns.contains(&self.data.target_column) {
            anyhow::bail!(
                "target column '{}' is also listed as a feature column",
                self.data.target_column
            );
        }
        if self.export.parquet && !cfg!(feature = "parquet") {
            anyhow::bail!("export.parquet = true requires building with the `parquet` feature");
        }
        if self.export.xlsx && !cfg!(feature = "xlsx") {
            anyhow::bail!("export.xlsx = true requires building with the `xlsx` feature");
        }
        if self.model.kind == ForecasterKind::Persistence && !self.window.include_target {
            anyhow::bail!(
                "model.kind = \"persistence\" needs the target column in the input windows (window.include_target = true)"
            );
        }
        if self.model.kind == ForecasterKind::RandomForest && !cfg!(feature = "ml") {
            anyhow::bail!("model.kind = \"random_forest\" requires building with the `ml` feature");
        }
        Ok(())
    }
}
