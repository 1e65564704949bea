//! Train/test splitting and robust scaling

pub mod scaler;
pub mod split;

pub use scaler::{percentile, ColumnScale, ScalerState};
pub use split::{segment_lengths, split, SplitRatios};
