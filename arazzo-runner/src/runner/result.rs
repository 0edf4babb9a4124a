use serde_json::{Map, Value as JsonValue};

/// Outcome of a single `execute_next_step` call.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepRunResult {
    /// The step finished and the workflow moves on to `next_step_id`.
    StepComplete {
        step_id: String,
        success: bool,
        outputs: Map<String, JsonValue>,
        #[serde(skip_serializing_if = "Option::is_none")]
        next_step_id: Option<String>,
    },
    WorkflowComplete {
        workflow_id: String,
        outputs: Map<String, JsonValue>,
    },
    /// The workflow ended unsuccessfully.
    Error {
        workflow_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        step_id: Option<String>,
        error: String,
    },
    /// Control passes to another workflow; the current execution is over.
    GotoWorkflow {
        step_id: String,
        workflow_id: String,
    },
    GotoStep {
        step_id: String,
        target_step_id: String,
    },
    /// The step failed and will be attempted again.
    Retry {
        step_id: String,
        attempt: u32,
        retry_limit: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after: Option<f64>,
        /// Delay requested by the server's `Retry-After` header, in seconds.
        #[serde(skip_serializing_if = "Option::is_none")]
        server_retry_after: Option<f64>,
    },
    /// The step could not be executed at all (unresolvable operation,
    /// missing server variable, transport failure).
    StepError {
        step_id: String,
        error: String,
    },
}

impl StepRunResult {
    /// True when the execution cannot make further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::WorkflowComplete { .. } | Self::Error { .. } | Self::GotoWorkflow { .. } | Self::StepError { .. }
        )
    }

    pub fn step_id(&self) -> Option<&str> {
        match self {
            Self::StepComplete { step_id, .. }
            | Self::GotoWorkflow { step_id, .. }
            | Self::GotoStep { step_id, .. }
            | Self::Retry { step_id, .. }
            | Self::StepError { step_id, .. } => Some(step_id),
            Self::Error { step_id, .. } => step_id.as_deref(),
            Self::WorkflowComplete { .. } => None,
        }
    }
}
