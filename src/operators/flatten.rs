//! `Flatten`: turns windows into feature rows.

use crate::core::Table;
use crate::engine::pipeline::{Frame, Stage, Step};
use crate::engine::window::{self, WindowBatch};
use crate::error::{OperatorError, Result};
use crate::operators::traits::Described;
use crate::schema::{common, OperatorSchema, Tags};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

/// `Flatten` has no hyperparameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlattenConfig {}

/// Flattens each `lookback × width` window into one time-major row.
#[derive(Debug, Clone, Default)]
pub struct Flatten {
    inner: window::Flatten,
}

impl Flatten {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the window shape.
    pub fn fit(&mut self, windows: &WindowBatch) -> Result<&mut Self> {
        self.inner.fit(&Frame::Windows(windows.clone()))?;
        debug!(
            lookback = windows.lookback(),
            width = windows.width(),
            "fitted Flatten"
        );
        Ok(self)
    }

    /// One row per window.
    pub fn transform(&self, windows: WindowBatch) -> Result<Table> {
        if self.inner.fitted_shape().is_none() {
            return Err(OperatorError::NotFitted { operator: Self::NAME });
        }
        let frame = self.inner.transform(Frame::Windows(windows))?;
        Ok(frame.as_table(Self::NAME)?.clone())
    }
}

impl From<Flatten> for Step {
    fn from(op: Flatten) -> Self {
        Step::stage(op.inner)
    }
}

impl Described for Flatten {
    const NAME: &'static str = "Flatten";
    type Config = FlattenConfig;

    fn schema() -> OperatorSchema {
        let windows = json!({
            "description": "Windows; samples × lookback × columns.",
            "type": "array",
            "items": {"type": "array", "items": {"type": "array", "items": {"type": "number"}}},
        });
        OperatorSchema {
            name: Self::NAME,
            description: "Flattens each lookback window into a single time-major feature row.".into(),
            documentation_url: common::documentation_url(Self::NAME),
            import_from: "anofox_operators::operators",
            tags: Tags::op(&["transformer"]),
            hyperparams: common::hyperparams(Vec::new(), &[]),
            input_fit: json!({
                "type": "object",
                "required": ["X"],
                "additionalProperties": false,
                "properties": {"X": windows.clone(), "y": {"description": "Ignored."}},
            }),
            input_predict: json!({
                "type": "object",
                "required": ["X"],
                "additionalProperties": false,
                "properties": {"X": windows},
            }),
            output_predict: json!({
                "description": "Feature rows; the outer array is over windows.",
                "type": "array",
                "items": {"type": "array", "items": {"type": "number"}},
            }),
        }
    }

    fn from_config(_config: FlattenConfig) -> Result<Self> {
        Ok(Self::new())
    }

    fn hyperparams(&self) -> serde_json::Value {
        json!({})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::window::sliding_windows;

    fn windows() -> WindowBatch {
        let t = Table::from_rows((0..5).map(|i| vec![i as f64, 10.0 * i as f64]).collect()).unwrap();
        sliding_windows(&t, 2).unwrap()
    }

    #[test]
    fn transform_before_fit_is_a_state_error() {
        let op = Flatten::new();
        assert!(op.transform(windows()).unwrap_err().is_state());
    }

    #[test]
    fn flattens_time_major() {
        let mut op = Flatten::new();
        let rows = op.fit(&windows()).unwrap().transform(windows()).unwrap();
        assert_eq!(rows.shape(), (4, 4));
        assert_eq!(rows.row(0), &[0.0, 0.0, 1.0, 10.0]);
    }

    #[test]
    fn unknown_hyperparameters_are_rejected() {
        assert!(Flatten::from_json(&json!({})).is_ok());
        assert!(Flatten::from_json(&json!({"order": "C"})).unwrap_err().is_configuration());
    }

    #[test]
    fn becomes_a_pipeline_step() {
        let step: Step = Flatten::new().into();
        assert_eq!(step.name(), "Flatten");
    }
}
