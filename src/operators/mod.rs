//! Schema-described operators.
//!
//! Each operator binds a validated configuration to an engine estimator,
//! publishes its hyperparameter schema through [`Described`] and forwards
//! `fit`/`predict` through [`Estimator`]. Anomaly-oriented operators also
//! implement [`AnomalyDetector`].
//!
//! # Example
//!
//! ```
//! use anofox_operators::core::Table;
//! use anofox_operators::operators::{Estimator, WindowedConfig, WindowedPCA};
//!
//! let rows = (0..120).map(|i| vec![(i as f64 * 0.1).sin()]).collect();
//! let x = Table::from_rows(rows).unwrap();
//!
//! let mut op = WindowedPCA::new(WindowedConfig::default().with_lookback(10)).unwrap();
//! let labels = op.fit(&x, None).unwrap().predict(Some(&x)).unwrap();
//! assert_eq!(labels.len(), x.rows());
//! ```

mod auto_regression;
mod flatten;
mod gaussian_graphical;
mod generalized_anomaly_model;
mod registry;
mod traits;
mod ts_ad_pipeline;
mod windowed;

pub use auto_regression::AutoRegression;
pub use flatten::{Flatten, FlattenConfig};
pub use gaussian_graphical::GaussianGraphicalModel;
pub use generalized_anomaly_model::GeneralizedAnomalyModel;
pub use registry::{OperatorFamily, OperatorRegistry, OperatorSpec};
pub use traits::{AnomalyDetector, Described, Estimator};
pub use ts_ad_pipeline::TSADPipeline;
pub use windowed::{
    DefaultSteps, IsolationForestSteps, LofSteps, NearestNeighborSteps, PcaSteps, Windowed,
    WindowedConfig, WindowedIsolationForest, WindowedLOF, WindowedNN, WindowedPCA, RANDOM_STATE,
};
