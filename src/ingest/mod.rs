pub mod calendar;
pub mod loader;

pub use calendar::*;
pub use loader::*;
