//! Catalog of the operators and their schemas.
//!
//! # Example
//!
//! ```
//! use anofox_operators::operators::OperatorRegistry;
//! use serde_json::json;
//!
//! let registry = OperatorRegistry::builtin();
//! let spec = registry.get("WindowedPCA").unwrap();
//! assert!(spec.check(&json!({"lookback_win": 20})).is_ok());
//! assert!(spec.check(&json!({"lookback_win": 0})).is_err());
//! ```

use crate::error::Result;
use crate::operators::traits::Described;
use crate::operators::{
    AutoRegression, Flatten, GaussianGraphicalModel, GeneralizedAnomalyModel, TSADPipeline,
    WindowedIsolationForest, WindowedLOF, WindowedNN, WindowedPCA,
};
use crate::schema::OperatorSchema;
use serde_json::{Map, Value};
use std::fmt;

/// Broad role of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorFamily {
    /// Pipeline transformer.
    Transformer,
    /// Row-wise anomaly estimator.
    AnomalyEstimator,
    /// Windowed anomaly pipeline.
    WindowedAnomaly,
    Forecaster,
}

impl OperatorFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorFamily::Transformer => "transformer",
            OperatorFamily::AnomalyEstimator => "anomaly_estimator",
            OperatorFamily::WindowedAnomaly => "windowed_anomaly",
            OperatorFamily::Forecaster => "forecaster",
        }
    }
}

impl fmt::Display for OperatorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry entry: an operator's name, family, schema and hyperparameter
/// validator.
pub struct OperatorSpec {
    pub name: &'static str,
    pub family: OperatorFamily,
    schema: fn() -> OperatorSchema,
    validator: Box<dyn Fn(&Value) -> Result<()> + Send + Sync>,
}

impl OperatorSpec {
    /// Entry for a described operator.
    pub fn of<T: Described + 'static>(family: OperatorFamily) -> Self {
        Self {
            name: T::NAME,
            family,
            schema: T::schema,
            validator: Box::new(|hyperparams: &Value| T::from_json(hyperparams).map(|_| ())),
        }
    }

    pub fn schema(&self) -> OperatorSchema {
        (self.schema)()
    }

    /// Check a JSON hyperparameter object by building the operator from it.
    pub fn check(&self, hyperparams: &Value) -> Result<()> {
        (self.validator)(hyperparams)
    }
}

impl fmt::Debug for OperatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorSpec")
            .field("name", &self.name)
            .field("family", &self.family)
            .finish()
    }
}

/// Registry of operator specifications.
#[derive(Debug)]
pub struct OperatorRegistry {
    operators: Vec<OperatorSpec>,
}

impl OperatorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            operators: Vec::new(),
        }
    }

    /// Registry holding every operator of this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(OperatorSpec::of::<Flatten>(OperatorFamily::Transformer));
        registry.register(OperatorSpec::of::<GeneralizedAnomalyModel>(
            OperatorFamily::AnomalyEstimator,
        ));
        registry.register(OperatorSpec::of::<TSADPipeline>(OperatorFamily::WindowedAnomaly));
        registry.register(OperatorSpec::of::<WindowedPCA>(OperatorFamily::WindowedAnomaly));
        registry.register(OperatorSpec::of::<WindowedNN>(OperatorFamily::WindowedAnomaly));
        registry.register(OperatorSpec::of::<WindowedLOF>(OperatorFamily::WindowedAnomaly));
        registry.register(OperatorSpec::of::<WindowedIsolationForest>(
            OperatorFamily::WindowedAnomaly,
        ));
        registry.register(OperatorSpec::of::<GaussianGraphicalModel>(
            OperatorFamily::AnomalyEstimator,
        ));
        registry.register(OperatorSpec::of::<AutoRegression>(OperatorFamily::Forecaster));
        registry
    }

    /// Register an operator specification. A spec with the same name
    /// replaces the earlier one.
    pub fn register(&mut self, spec: OperatorSpec) {
        match self.operators.iter_mut().find(|s| s.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.operators.push(spec),
        }
    }

    pub fn get(&self, name: &str) -> Option<&OperatorSpec> {
        self.operators.iter().find(|s| s.name == name)
    }

    /// Get the number of registered operators.
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Iterate over registered operators in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &OperatorSpec> {
        self.operators.iter()
    }

    /// Operators of one family.
    pub fn family(&self, family: OperatorFamily) -> impl Iterator<Item = &OperatorSpec> {
        self.operators.iter().filter(move |s| s.family == family)
    }

    /// JSON object mapping every operator name to its combined schema.
    pub fn catalog(&self) -> Value {
        let entries: Map<String, Value> = self
            .operators
            .iter()
            .map(|spec| (spec.name.to_string(), spec.schema().to_json()))
            .collect();
        Value::Object(entries)
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_lists_every_operator_once() {
        let registry = OperatorRegistry::builtin();
        assert_eq!(registry.len(), 9);
        let names: Vec<&str> = registry.iter().map(|s| s.name).collect();
        for name in [
            "Flatten",
            "GeneralizedAnomalyModel",
            "TSADPipeline",
            "WindowedPCA",
            "WindowedNN",
            "WindowedLOF",
            "WindowedIsolationForest",
            "GaussianGraphicalModel",
            "AutoRegression",
        ] {
            assert!(names.contains(&name), "missing {name}");
        }
        assert_eq!(registry.family(OperatorFamily::WindowedAnomaly).count(), 5);
    }

    #[test]
    fn register_replaces_by_name() {
        let mut registry = OperatorRegistry::new();
        assert!(registry.is_empty());
        registry.register(OperatorSpec::of::<Flatten>(OperatorFamily::Transformer));
        registry.register(OperatorSpec::of::<Flatten>(OperatorFamily::AnomalyEstimator));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("Flatten").unwrap().family,
            OperatorFamily::AnomalyEstimator
        );
        assert!(registry.get("Scaler").is_none());
    }

    #[test]
    fn check_builds_the_operator() {
        let registry = OperatorRegistry::builtin();
        let tsad = registry.get("TSADPipeline").unwrap();
        assert!(tsad.check(&json!({})).unwrap_err().is_configuration());
        assert!(registry
            .get("AutoRegression")
            .unwrap()
            .check(&json!({"lookback_win": 3}))
            .is_ok());
    }

    #[test]
    fn catalog_is_keyed_by_name() {
        let catalog = OperatorRegistry::builtin().catalog();
        let map = catalog.as_object().unwrap();
        assert_eq!(map.len(), 9);
        assert_eq!(map["WindowedLOF"]["$schema"], crate::schema::SCHEMA_DIALECT);
        assert_eq!(OperatorFamily::Forecaster.to_string(), "forecaster");
    }
}
