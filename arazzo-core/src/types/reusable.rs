use crate::types::{AnyValue, RuntimeExpression};

/// `{ reference: $components.<kind>.<name>, value? }`
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReusableObject {
    pub reference: RuntimeExpression,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<AnyValue>,
}

impl ReusableObject {
    /// Component name when the reference has the form `$components.<kind>.<name>`.
    pub fn component_name(&self, kind: &str) -> Option<&str> {
        self.reference
            .trim()
            .strip_prefix("$components.")?
            .strip_prefix(kind)?
            .strip_prefix('.')
            .filter(|name| !name.is_empty())
    }
}
