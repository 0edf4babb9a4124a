use crate::types::{Criterion, Extensions, ReusableObject};

/// Attempts allowed by a `retry` action that omits `retryLimit`.
pub const DEFAULT_RETRY_LIMIT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuccessActionType {
    End,
    Goto,
}

/// Entry of `onSuccess` / `successActions`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessAction {
    pub name: String,
    #[serde(rename = "type")]
    pub action_type: SuccessActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<Vec<Criterion>>,
    #[serde(flatten, default)]
    pub extensions: Extensions,
}

impl SuccessAction {
    /// Conditions gating the action; empty means it always applies.
    pub fn criteria(&self) -> &[Criterion] {
        self.criteria.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureActionType {
    End,
    Retry,
    Goto,
}

/// Entry of `onFailure` / `failureActions`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureAction {
    pub name: String,
    #[serde(rename = "type")]
    pub action_type: FailureActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Seconds to wait before retrying.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "retryAfter")]
    pub retry_after_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<Vec<Criterion>>,
    #[serde(flatten, default)]
    pub extensions: Extensions,
}

impl FailureAction {
    pub fn criteria(&self) -> &[Criterion] {
        self.criteria.as_deref().unwrap_or(&[])
    }

    pub fn effective_retry_limit(&self) -> u32 {
        self.retry_limit.unwrap_or(DEFAULT_RETRY_LIMIT)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum SuccessActionOrReusable {
    Action(SuccessAction),
    Reusable(ReusableObject),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum FailureActionOrReusable {
    Action(FailureAction),
    Reusable(ReusableObject),
}
