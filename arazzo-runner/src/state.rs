use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};

use crate::config::RuntimeParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failure,
    Skipped,
}

/// Mutable state of one workflow execution.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ExecutionState {
    pub workflow_id: String,
    pub current_step_id: Option<String>,
    pub inputs: JsonValue,
    /// Step id to that step's extracted outputs.
    pub step_outputs: BTreeMap<String, Map<String, JsonValue>>,
    pub workflow_outputs: Map<String, JsonValue>,
    /// Dependency workflow id to its terminal outputs.
    pub dependency_outputs: BTreeMap<String, Map<String, JsonValue>>,
    pub status: BTreeMap<String, StepStatus>,
    pub runtime_params: RuntimeParams,
}

impl ExecutionState {
    pub fn new<'a>(
        workflow_id: impl Into<String>,
        step_ids: impl IntoIterator<Item = &'a str>,
        inputs: JsonValue,
        runtime_params: RuntimeParams,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            current_step_id: None,
            inputs,
            step_outputs: BTreeMap::new(),
            workflow_outputs: Map::new(),
            dependency_outputs: BTreeMap::new(),
            status: step_ids
                .into_iter()
                .map(|id| (id.to_string(), StepStatus::Pending))
                .collect(),
            runtime_params,
        }
    }

    pub fn step_status(&self, step_id: &str) -> Option<StepStatus> {
        self.status.get(step_id).copied()
    }

    /// True when every step of the workflow ended in SUCCESS. A step left
    /// PENDING or SKIPPED (jumped over by a goto, cut short by an `end`)
    /// counts against the run.
    pub fn all_steps_succeeded(&self) -> bool {
        self.status.values().all(|s| *s == StepStatus::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    WorkflowComplete,
    Error,
}

/// Terminal result of a workflow run.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct WorkflowExecutionResult {
    pub status: WorkflowStatus,
    pub workflow_id: String,
    pub outputs: Map<String, JsonValue>,
    pub step_outputs: BTreeMap<String, Map<String, JsonValue>>,
    pub inputs: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == WorkflowStatus::WorkflowComplete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_marks_all_steps_pending() {
        let s = ExecutionState::new("wf", ["a", "b"], JsonValue::Null, RuntimeParams::default());
        assert_eq!(s.step_status("a"), Some(StepStatus::Pending));
        assert_eq!(s.step_status("b"), Some(StepStatus::Pending));
        assert!(!s.all_steps_succeeded());
    }

    #[test]
    fn pending_or_skipped_steps_are_not_success() {
        let mut s = ExecutionState::new("wf", ["a", "b"], JsonValue::Null, RuntimeParams::default());
        s.status.insert("a".into(), StepStatus::Success);
        assert!(!s.all_steps_succeeded());
        s.status.insert("b".into(), StepStatus::Skipped);
        assert!(!s.all_steps_succeeded());
        s.status.insert("b".into(), StepStatus::Success);
        assert!(s.all_steps_succeeded());
    }

    #[test]
    fn any_failure_breaks_all_steps_succeeded() {
        let mut s = ExecutionState::new("wf", ["a", "b"], JsonValue::Null, RuntimeParams::default());
        s.status.insert("a".into(), StepStatus::Failure);
        s.status.insert("b".into(), StepStatus::Success);
        assert!(!s.all_steps_succeeded());
    }
}
