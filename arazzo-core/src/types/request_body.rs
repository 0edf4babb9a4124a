use crate::types::{AnyValue, Extensions};

/// Overwrites the payload location addressed by `target` (a JSON Pointer)
/// once the payload has been evaluated.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PayloadReplacement {
    pub target: String,
    pub value: AnyValue,
    #[serde(flatten, default)]
    pub extensions: Extensions,
}

/// Step-level request body.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<AnyValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacements: Option<Vec<PayloadReplacement>>,
    #[serde(flatten, default)]
    pub extensions: Extensions,
}

impl RequestBody {
    pub fn replacements(&self) -> &[PayloadReplacement] {
        self.replacements.as_deref().unwrap_or(&[])
    }

    /// Neither a payload nor replacements: nothing to send.
    pub fn is_empty(&self) -> bool {
        self.payload.is_none() && self.replacements().is_empty()
    }
}
