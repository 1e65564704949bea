//! Sliding-window dataset builder
//!
//! Turns a scaled, time-ordered table into overlapping input windows
//! (stride 1) and the target value `horizon` steps after each window.
//!
//! ```text
//! rows:     0 1 2 3 4 5 6 7 8 9
//! window 0: [0 1 2]      target at 2 + h
//! window 1:   [1 2 3]    target at 3 + h
//! count = L - time_steps - horizon + 1
//! ```

use chrono::NaiveDateTime;
use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayView3, Axis};
use serde::Serialize;
use std::ops::Range;
use tracing::debug;

use crate::domain::TimeSeriesTable;
use crate::error::{ConfigError, Result};

/// Number of windows a table of `len` rows yields; 0 when none fit
pub fn window_count(len: usize, time_steps: usize, horizon: usize) -> usize {
    (len + 1).saturating_sub(time_steps + horizon)
}

/// Window length, horizon and input column selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Windower {
    time_steps: usize,
    horizon: usize,
    include_target: bool,
}

impl Windower {
    pub fn new(time_steps: usize, horizon: usize) -> Result<Self> {
        if time_steps == 0 {
            return Err(ConfigError::ZeroParameter("time_steps").into());
        }
        if horizon == 0 {
            return Err(ConfigError::ZeroParameter("horizon").into());
        }
        Ok(Self {
            time_steps,
            horizon,
            include_target: true,
        })
    }

    /// Keep the target column out of the input windows
    pub fn include_target(mut self, include: bool) -> Self {
        self.include_target = include;
        self
    }

    pub fn time_steps(&self) -> usize {
        self.time_steps
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn count(&self, len: usize) -> usize {
        window_count(len, self.time_steps, self.horizon)
    }

    /// Rows of a `len`-row table that supply the targets, in window order
    pub fn target_rows(&self, len: usize) -> Range<usize> {
        let first = self.time_steps + self.horizon - 1;
        first..first + self.count(len)
    }

    /// Fail before windowing when the table is too short for a single window
    pub fn check_length(&self, len: usize) -> Result<()> {
        if self.count(len) == 0 {
            return Err(ConfigError::WindowTooLong {
                time_steps: self.time_steps,
                horizon: self.horizon,
                length: len,
            }
            .into());
        }
        Ok(())
    }

    pub fn apply(&self, table: &TimeSeriesTable, target_column: &str) -> Result<WindowedDataset> {
        let schema = table.schema();
        let target_idx = schema.require(target_column)?;
        self.check_length(table.len())?;

        let (input_idx, input_columns): (Vec<usize>, Vec<String>) = schema
            .columns()
            .iter()
            .enumerate()
            .filter(|(i, _)| self.include_target || *i != target_idx)
            .map(|(i, name)| (i, name.clone()))
            .unzip();
        if input_idx.is_empty() {
            return Err(ConfigError::Invalid("no input columns left to window".to_string()).into());
        }

        let n = self.count(table.len());
        let values = table.values();
        let rows = self.target_rows(table.len());

        let inputs = Array3::from_shape_fn((n, self.time_steps, input_idx.len()), |(i, t, c)| {
            values[[i + t, input_idx[c]]]
        });
        let targets = Array1::from_shape_fn(n, |i| values[[rows.start + i, target_idx]]);
        let target_timestamps = table.timestamps()[rows].to_vec();

        debug!(
            windows = n,
            time_steps = self.time_steps,
            horizon = self.horizon,
            features = input_idx.len(),
            "built windowed dataset"
        );

        Ok(WindowedDataset {
            inputs,
            targets,
            target_timestamps,
            input_columns,
            target_column: target_column.to_string(),
            time_steps: self.time_steps,
            horizon: self.horizon,
        })
    }
}

/// Reshape (windows, time_steps, features) into (windows, time_steps * features).
///
/// Each output row holds the window's rows back to back, oldest first.
pub fn flatten_windows(inputs: ArrayView3<'_, f64>) -> Array2<f64> {
    let (n, _, f) = inputs.dim();
    let width = inputs.len_of(Axis(1)) * f;
    Array2::from_shape_fn((n, width), |(i, j)| inputs[[i, j / f, j % f]])
}

/// Shorthand for `Windower::new(time_steps, horizon)?.apply(table, target_column)`
pub fn window(
    table: &TimeSeriesTable,
    target_column: &str,
    time_steps: usize,
    horizon: usize,
) -> Result<WindowedDataset> {
    Windower::new(time_steps, horizon)?.apply(table, target_column)
}

/// Model-ready arrays: `inputs` is (windows, time_steps, features)
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedDataset {
    pub inputs: Array3<f64>,
    pub targets: Array1<f64>,
    /// Timestamp of the row each target was taken from
    pub target_timestamps: Vec<NaiveDateTime>,
    pub input_columns: Vec<String>,
    pub target_column: String,
    pub time_steps: usize,
    pub horizon: usize,
}

impl WindowedDataset {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.inputs.len_of(Axis(2))
    }

    pub fn window(&self, i: usize) -> ArrayView2<'_, f64> {
        self.inputs.index_axis(Axis(0), i)
    }

    /// Position of the target column inside each window row, if it was kept
    pub fn target_input_index(&self) -> Option<usize> {
        self.input_columns.iter().position(|c| *c == self.target_column)
    }

    pub fn flattened(&self) -> Array2<f64> {
        flatten_windows(self.inputs.view())
    }
}
