//! Error types for the anofox-operators library.
//!
//! Two layers report failures. The estimator engine reports [`EngineError`];
//! the schema-described operators wrap it verbatim in
//! [`OperatorError::Delegated`] and add their own configuration and lifecycle
//! errors.

use thiserror::Error;

/// Result type alias for operator calls.
pub type Result<T> = std::result::Result<T, OperatorError>;

/// Result type alias for engine calls.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors raised by the estimator engine during fit, transform or predict.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Input data is empty.
    #[error("empty input data")]
    EmptyData,

    /// Insufficient data points for the operation.
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Dimension mismatch between data structures.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A configured column index does not exist in the input.
    #[error("column {index} out of range for input with {width} columns")]
    ColumnOutOfRange { index: usize, width: usize },

    /// Feature and target columns resolve to nothing once the time column
    /// is removed.
    #[error("no model columns left in input with {width} columns")]
    NoModelColumns { width: usize },

    /// Estimator has not been fitted yet.
    #[error("estimator must be fitted before use")]
    FitRequired,

    /// The estimator cannot predict without new input.
    #[error("input data is required for prediction")]
    InputRequired,

    /// Prediction without input needs the stored lookback history.
    #[error("no lookback history stored; fit with store_lookback_history or pass input")]
    HistoryUnavailable,

    /// The step list cannot be executed.
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// A stage received data in a shape it does not handle.
    #[error("unexpected frame: {0}")]
    UnexpectedFrame(String),

    /// Computation error (e.g., numerical issues).
    #[error("computation error: {0}")]
    ComputationError(String),
}

/// Errors raised by schema-described operators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperatorError {
    /// A hyperparameter is missing or outside its declared domain.
    #[error("invalid hyperparameter `{param}`: {reason}")]
    Configuration { param: String, reason: String },

    /// A method was called out of lifecycle order.
    #[error("{operator} must be fitted before this call")]
    NotFitted { operator: &'static str },

    /// Failure reported by the wrapped estimator, unchanged.
    #[error(transparent)]
    Delegated(#[from] EngineError),
}

impl OperatorError {
    /// Shorthand for a configuration error.
    pub fn config(param: impl Into<String>, reason: impl Into<String>) -> Self {
        OperatorError::Configuration {
            param: param.into(),
            reason: reason.into(),
        }
    }

    /// Whether this is a configuration (schema) violation.
    pub fn is_configuration(&self) -> bool {
        matches!(self, OperatorError::Configuration { .. })
    }

    /// Whether this is a lifecycle (state) violation.
    pub fn is_state(&self) -> bool {
        matches!(self, OperatorError::NotFitted { .. })
    }
}

impl From<serde_json::Error> for OperatorError {
    fn from(err: serde_json::Error) -> Self {
        OperatorError::config("hyperparams", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let err = EngineError::EmptyData;
        assert_eq!(err.to_string(), "empty input data");

        let err = EngineError::InsufficientData { needed: 10, got: 5 };
        assert_eq!(
            err.to_string(),
            "insufficient data: need at least 10, got 5"
        );

        let err = EngineError::ColumnOutOfRange { index: 4, width: 3 };
        assert_eq!(
            err.to_string(),
            "column 4 out of range for input with 3 columns"
        );

        let err = OperatorError::config("lookback_win", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "invalid hyperparameter `lookback_win`: must be at least 1"
        );

        let err = OperatorError::NotFitted {
            operator: "WindowedPCA",
        };
        assert_eq!(err.to_string(), "WindowedPCA must be fitted before this call");
    }

    #[test]
    fn delegated_errors_are_transparent() {
        let inner = EngineError::DimensionMismatch {
            expected: 3,
            got: 2,
        };
        let err: OperatorError = inner.clone().into();
        assert_eq!(err.to_string(), inner.to_string());
        assert_eq!(err, OperatorError::Delegated(inner));
        assert!(!err.is_configuration());
        assert!(!err.is_state());
    }

    #[test]
    fn json_errors_become_configuration_errors() {
        let err: OperatorError = serde_json::from_str::<u32>("-1").unwrap_err().into();
        assert!(err.is_configuration());
    }
}
