pub mod windower;

pub use windower::{flatten_windows, window, window_count, WindowedDataset, Windower};
