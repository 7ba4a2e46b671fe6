//! Core data structures: tabular input and prediction output.

mod prediction;
mod table;

pub use prediction::Prediction;
pub use table::Table;
