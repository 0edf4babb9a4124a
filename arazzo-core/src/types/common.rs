use std::collections::BTreeMap;

pub type AnyValue = serde_json::Value;
pub type JsonSchema = serde_json::Value;
pub type RuntimeExpression = String;

/// Specification Extensions (`x-...`) and any other unknown fields.
pub type Extensions = BTreeMap<String, serde_json::Value>;
