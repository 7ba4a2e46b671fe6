//! Estimator library behind the operators.
//!
//! Everything numeric lives here: windowing, the anomaly learners, pipeline
//! execution, distance metrics, scoring methods and the forecasters. The
//! operators in [`crate::operators`] only validate configurations and
//! delegate.

pub mod autoregression;
pub mod distance;
pub mod generalized;
pub mod graph_lasso;
pub mod graphical;
pub mod isolation;
pub mod linalg;
pub mod neighbors;
pub mod pca;
pub mod pipeline;
pub mod scoring;
pub mod stats;
pub mod window;
pub mod window_ad;

pub use autoregression::{AutoRegressionConfig, VectorAutoRegression};
pub use generalized::{AnomalyLearner, BaseLearner, GeneralizedAnomalyModel, GeneralizedConfig};
pub use graphical::{CovarianceLearner, GaussianGraphicalConfig, GaussianGraphicalModel};
pub use pipeline::{Frame, Stage, StageKind, StageOutput, Step, Steps};
pub use window::{Flatten, WindowBatch};
pub use window_ad::{WindowAD, WindowADConfig};
