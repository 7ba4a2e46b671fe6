//! JSON-Schema metadata published for downstream hyperparameter tooling.

pub mod common;
mod operator;

pub use operator::{OperatorSchema, Tags, SCHEMA_DIALECT};
