//! Typed hyperparameter domains shared by several operators.
//!
//! Every domain here has a JSON encoding that matches the published
//! hyperparameter schemas, including the `-1` sentinels.

mod metric;
mod scoring;
mod sentinel;

pub use metric::{DistanceMetric, GraphDistance};
pub use scoring::{PredictionType, ScoreOutput, ScoringMethod, ScoringRule};
pub use sentinel::{ColumnSelection, SlidingWindow, TimeColumn};
