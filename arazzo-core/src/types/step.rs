use std::collections::BTreeMap;

use crate::types::{
    Criterion, Extensions, FailureActionOrReusable, ParameterOrReusable, RequestBody,
    RuntimeExpression, SuccessActionOrReusable,
};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Step {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "stepId")]
    pub step_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "operationId")]
    pub operation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "operationPath")]
    pub operation_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "workflowId")]
    pub workflow_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<ParameterOrReusable>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "requestBody")]
    pub request_body: Option<RequestBody>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "successCriteria")]
    pub success_criteria: Option<Vec<Criterion>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "onSuccess")]
    pub on_success: Option<Vec<SuccessActionOrReusable>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "onFailure")]
    pub on_failure: Option<Vec<FailureActionOrReusable>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<BTreeMap<String, RuntimeExpression>>,

    #[serde(flatten, default)]
    pub extensions: Extensions,
}

/// What a step invokes. Exactly one of `operationId`, `operationPath` and
/// `workflowId` is expected; `operationId` wins when several are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepTarget<'a> {
    OperationId(&'a str),
    OperationPath(&'a str),
    Workflow(&'a str),
    None,
}

impl Step {
    pub fn target(&self) -> StepTarget<'_> {
        if let Some(id) = &self.operation_id {
            return StepTarget::OperationId(id);
        }
        if let Some(path) = &self.operation_path {
            return StepTarget::OperationPath(path);
        }
        if let Some(wf) = &self.workflow_id {
            return StepTarget::Workflow(wf);
        }
        StepTarget::None
    }

    pub fn parameters(&self) -> &[ParameterOrReusable] {
        self.parameters.as_deref().unwrap_or(&[])
    }

    pub fn success_criteria(&self) -> &[Criterion] {
        self.success_criteria.as_deref().unwrap_or(&[])
    }
}
