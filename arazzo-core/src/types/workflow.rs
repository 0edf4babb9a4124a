use std::collections::BTreeMap;

use crate::types::{
    Extensions, FailureActionOrReusable, JsonSchema, ParameterOrReusable, RuntimeExpression, Step,
    SuccessActionOrReusable,
};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Workflow {
    #[serde(rename = "workflowId")]
    pub workflow_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<JsonSchema>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "dependsOn")]
    pub depends_on: Option<Vec<String>>,

    pub steps: Vec<Step>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "successActions")]
    pub success_actions: Option<Vec<SuccessActionOrReusable>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "failureActions")]
    pub failure_actions: Option<Vec<FailureActionOrReusable>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<BTreeMap<String, RuntimeExpression>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<ParameterOrReusable>>,

    #[serde(flatten, default)]
    pub extensions: Extensions,
}

impl Workflow {
    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.step_id == step_id)
    }

    pub fn depends_on(&self) -> &[String] {
        self.depends_on.as_deref().unwrap_or(&[])
    }
}
