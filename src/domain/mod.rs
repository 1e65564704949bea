pub mod prediction;
pub mod series;

pub use prediction::*;
pub use series::*;
