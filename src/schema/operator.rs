//! Combined schema document of one operator.

use serde_json::{json, Map, Value};

/// JSON-Schema dialect every operator schema is written in.
pub const SCHEMA_DIALECT: &str = "http://json-schema.org/draft-04/schema#";

/// Operator roles, before, as and after which an operator can be used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags {
    pub pre: Vec<&'static str>,
    pub op: Vec<&'static str>,
    pub post: Vec<&'static str>,
}

impl Tags {
    /// Tags with only operator roles.
    pub fn op(roles: &[&'static str]) -> Self {
        Self {
            op: roles.to_vec(),
            ..Self::default()
        }
    }
}

/// Machine-readable description of an operator: its hyperparameter domain
/// and the shapes of its fit/predict inputs and outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorSchema {
    pub name: &'static str,
    pub description: String,
    pub documentation_url: String,
    /// Rust path the operator is exported from.
    pub import_from: &'static str,
    pub tags: Tags,
    pub hyperparams: Value,
    pub input_fit: Value,
    pub input_predict: Value,
    pub output_predict: Value,
}

impl OperatorSchema {
    /// The combined draft-04 document.
    pub fn to_json(&self) -> Value {
        json!({
            "$schema": SCHEMA_DIALECT,
            "description": self.description,
            "documentation_url": self.documentation_url,
            "import_from": self.import_from,
            "type": "object",
            "tags": {
                "pre": self.tags.pre,
                "op": self.tags.op,
                "post": self.tags.post,
            },
            "properties": {
                "hyperparams": self.hyperparams,
                "input_fit": self.input_fit,
                "input_predict": self.input_predict,
                "output_predict": self.output_predict,
            },
        })
    }

    /// First `allOf` entry of the hyperparameter schema, which lists every
    /// constructor argument.
    pub fn hyperparam_object(&self) -> Option<&Map<String, Value>> {
        self.hyperparams
            .get("allOf")?
            .as_array()?
            .first()?
            .as_object()
    }

    /// Schema of one hyperparameter.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.hyperparam_object()?.get("properties")?.get(name)
    }

    /// Names of all declared hyperparameters.
    pub fn property_names(&self) -> Vec<&str> {
        self.hyperparam_object()
            .and_then(|o| o.get("properties"))
            .and_then(Value::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Hyperparameters listed as required.
    pub fn required(&self) -> Vec<&str> {
        self.hyperparam_object()
            .and_then(|o| o.get("required"))
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Object mapping every hyperparameter that declares a default to it.
    pub fn defaults(&self) -> Value {
        let mut out = Map::new();
        if let Some(props) = self
            .hyperparam_object()
            .and_then(|o| o.get("properties"))
            .and_then(Value::as_object)
        {
            for (name, schema) in props {
                if let Some(default) = schema.get("default") {
                    out.insert(name.clone(), default.clone());
                }
            }
        }
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::common;

    fn sample() -> OperatorSchema {
        OperatorSchema {
            name: "Sample",
            description: "A sample operator.".into(),
            documentation_url: common::documentation_url("Sample"),
            import_from: "anofox_operators::operators",
            tags: Tags::op(&["estimator"]),
            hyperparams: common::hyperparams(
                vec![
                    ("lookback_win", common::lookback_win(3)),
                    ("steps", common::required_steps()),
                ],
                &["lookback_win", "steps"],
            ),
            input_fit: common::input_fit(),
            input_predict: common::input_predict(true),
            output_predict: common::output_predict(),
        }
    }

    #[test]
    fn combined_document_layout() {
        let doc = sample().to_json();
        assert_eq!(doc["$schema"], SCHEMA_DIALECT);
        assert_eq!(doc["type"], "object");
        assert_eq!(doc["tags"]["op"][0], "estimator");
        for key in ["hyperparams", "input_fit", "input_predict", "output_predict"] {
            assert!(doc["properties"].get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn accessors_read_the_first_allof_entry() {
        let schema = sample();
        assert_eq!(schema.required(), vec!["lookback_win", "steps"]);
        assert_eq!(schema.property("lookback_win").unwrap()["minimum"], 1);
        assert!(schema.property("missing").is_none());
        assert_eq!(schema.defaults(), json!({ "lookback_win": 3 }));
        let mut names = schema.property_names();
        names.sort_unstable();
        assert_eq!(names, vec!["lookback_win", "steps"]);
    }
}
