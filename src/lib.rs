//! # anofox-operators
//!
//! Schema-described operators for time series anomaly detection and
//! forecasting.
//!
//! Every operator carries a JSON-Schema (draft-04) description of its
//! hyperparameters and of its fit/predict inputs and outputs, validates its
//! configuration before building, and forwards `fit`/`predict` to an
//! estimator from the [`engine`] module. Windowed detectors build a default
//! `Flatten` + learner pipeline when no steps are given.

// Allow some clippy warnings for cleaner code in specific cases
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]

pub mod core;
pub mod engine;
pub mod error;
pub mod operators;
pub mod params;
pub mod schema;

pub use error::{EngineError, OperatorError, Result};

pub mod prelude {
    pub use crate::core::{Prediction, Table};
    pub use crate::error::{EngineError, OperatorError, Result};
    pub use crate::operators::{
        AnomalyDetector, AutoRegression, Described, Estimator, GaussianGraphicalModel,
        OperatorRegistry, TSADPipeline, WindowedConfig, WindowedIsolationForest, WindowedLOF,
        WindowedNN, WindowedPCA,
    };
    pub use crate::params::{
        ColumnSelection, DistanceMetric, GraphDistance, PredictionType, ScoringMethod,
        SlidingWindow, TimeColumn,
    };
}
