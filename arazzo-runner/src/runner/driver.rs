use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use arazzo_core::types::{ArazzoDocument, Step, StepTarget, Workflow};
use serde_json::{Map, Value as JsonValue};

use crate::config::{RunnerConfig, RuntimeParams};
use crate::executor::{
    ActionHandler, GotoTarget, NextAction, ParameterProcessor, PreparedParameters, StepExecutor,
    SuccessCriteriaChecker,
};
use crate::retry::retry_delay;
use crate::runner::{RunnerError, StepRunResult};
use crate::state::{ExecutionState, StepStatus};

/// Why a frame was opened, and therefore how its result flows back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FrameRole {
    /// A workflow started by the caller.
    Root,
    /// A `dependsOn` workflow; outputs land in the parent's dependency outputs.
    Dependency { workflow_id: String },
    /// A `workflowId` step of the parent.
    NestedStep { step_id: String },
}

struct Terminal {
    success: bool,
    result: StepRunResult,
}

/// One active workflow: its state plus the cursor of the step loop.
pub(crate) struct Frame {
    pub(crate) state: ExecutionState,
    role: FrameRole,
    pending_dependencies: VecDeque<String>,
    next_index: usize,
    /// Attempts per step id, bounded by the retry action's limit.
    retries: HashMap<String, u32>,
    terminal: Option<Terminal>,
}

impl Frame {
    pub(crate) fn succeeded(&self) -> bool {
        self.terminal.as_ref().is_some_and(|t| t.success)
    }

    pub(crate) fn terminal_result(&self) -> Option<&StepRunResult> {
        self.terminal.as_ref().map(|t| &t.result)
    }

    fn failure_message(&self) -> String {
        match self.terminal_result() {
            Some(StepRunResult::Error { error, .. } | StepRunResult::StepError { error, .. }) => error.clone(),
            _ => format!("workflow '{}' did not complete", self.state.workflow_id),
        }
    }

    fn finish(&mut self, success: bool, result: StepRunResult) -> StepRunResult {
        self.terminal = Some(Terminal {
            success,
            result: result.clone(),
        });
        result
    }

    fn fail(&mut self, step_id: Option<String>, error: String) -> StepRunResult {
        let result = StepRunResult::Error {
            workflow_id: self.state.workflow_id.clone(),
            step_id,
            error,
        };
        self.finish(false, result)
    }

    /// Root workflows succeed when they reach their end; dependencies and
    /// nested workflows additionally need every step to have succeeded.
    fn complete(&mut self) -> StepRunResult {
        let success = self.role == FrameRole::Root || self.state.all_steps_succeeded();
        if success {
            let result = StepRunResult::WorkflowComplete {
                workflow_id: self.state.workflow_id.clone(),
                outputs: self.state.workflow_outputs.clone(),
            };
            self.finish(true, result)
        } else {
            let unsuccessful: Vec<String> = self
                .state
                .status
                .iter()
                .filter(|(_, s)| **s != StepStatus::Success)
                .map(|(id, s)| format!("{id} ({s:?})"))
                .collect();
            self.fail(None, format!("steps did not succeed: {}", unsuccessful.join(", ")))
        }
    }
}

struct ChildCall {
    workflow_id: String,
    inputs: JsonValue,
    role: FrameRole,
}

enum Progress {
    /// The frame needs a child workflow run to completion first.
    Call(ChildCall),
    Ran(StepRunResult),
    Finished,
}

/// Everything needed to advance frames; shared by all executions of a runner.
pub(crate) struct Engine {
    pub(crate) document: Arc<ArazzoDocument>,
    pub(crate) config: RunnerConfig,
    pub(crate) steps: StepExecutor,
}

impl Engine {
    pub(crate) fn new_frame(
        &self,
        workflow_id: &str,
        inputs: JsonValue,
        runtime_params: RuntimeParams,
        role: FrameRole,
    ) -> Result<Frame, RunnerError> {
        let workflow = self
            .document
            .workflow(workflow_id)
            .ok_or_else(|| RunnerError::WorkflowNotFound(workflow_id.to_string()))?;
        let state = ExecutionState::new(
            workflow_id,
            workflow.steps.iter().map(|s| s.step_id.as_str()),
            inputs,
            runtime_params,
        );
        Ok(Frame {
            state,
            role,
            pending_dependencies: workflow.depends_on().iter().cloned().collect(),
            next_index: 0,
            retries: HashMap::new(),
            terminal: None,
        })
    }

    /// Run every pending dependency of `frame` to completion. The first
    /// failing dependency fails the whole call.
    pub(crate) async fn run_dependencies(&self, frame: &mut Frame) -> Result<(), RunnerError> {
        while let Some(dependency) = frame.pending_dependencies.pop_front() {
            tracing::debug!(workflow_id = %frame.state.workflow_id, %dependency, "running dependency");
            let child = self.new_frame(
                &dependency,
                frame.state.inputs.clone(),
                frame.state.runtime_params.clone(),
                FrameRole::Dependency {
                    workflow_id: dependency.clone(),
                },
            );
            let failed = |message: String| RunnerError::DependencyFailed {
                workflow_id: frame.state.workflow_id.clone(),
                dependency: dependency.clone(),
                message,
            };
            let child = match child {
                Ok(child) => self.run_frames(child, 1).await,
                Err(e) => return Err(failed(e.to_string())),
            };
            if !child.succeeded() {
                return Err(failed(child.failure_message()));
            }
            frame
                .state
                .dependency_outputs
                .insert(dependency.clone(), child.state.workflow_outputs);
        }
        Ok(())
    }

    /// Advance a root frame by one step. Nested workflow steps run their
    /// child workflow to completion inside this call.
    pub(crate) async fn step_root(&self, frame: &mut Frame) -> StepRunResult {
        loop {
            match self.advance(frame).await {
                Progress::Ran(result) => return result,
                Progress::Finished => {
                    if let Some(result) = frame.terminal_result() {
                        return result.clone();
                    }
                    return frame.fail(None, "workflow finished without a result".to_string());
                }
                Progress::Call(call) => {
                    let child = match self.open_child(&call, &frame.state.runtime_params, 1) {
                        Ok(child) => self.run_frames(child, 1).await,
                        Err(e) => {
                            if let Some(result) = self.child_failed(frame, &call.role, e.to_string()) {
                                return result;
                            }
                            continue;
                        }
                    };
                    if let Some(result) = self.resume(frame, child) {
                        return result;
                    }
                }
            }
        }
    }

    /// Drive `root` and any children it opens until `root` finishes.
    /// `active` counts the frames already open below `root`.
    async fn run_frames(&self, root: Frame, active: usize) -> Frame {
        let mut current = root;
        let mut parents: Vec<Frame> = Vec::new();
        let mut hops = 0usize;
        loop {
            match self.advance(&mut current).await {
                Progress::Call(call) => {
                    let depth = active + parents.len() + 1;
                    match self.open_child(&call, &current.state.runtime_params, depth) {
                        Ok(child) => parents.push(std::mem::replace(&mut current, child)),
                        Err(e) => {
                            self.child_failed(&mut current, &call.role, e.to_string());
                        }
                    }
                }
                Progress::Ran(StepRunResult::GotoWorkflow { workflow_id, .. }) => {
                    hops += 1;
                    if hops > self.config.max_call_depth {
                        current.fail(None, format!("more than {} workflow jumps", self.config.max_call_depth));
                        continue;
                    }
                    let inputs = current.state.inputs.clone();
                    let params = current.state.runtime_params.clone();
                    match self.new_frame(&workflow_id, inputs, params, current.role.clone()) {
                        Ok(next) => current = next,
                        Err(e) => {
                            current.fail(None, e.to_string());
                        }
                    }
                }
                Progress::Ran(StepRunResult::Retry {
                    retry_after,
                    server_retry_after,
                    ..
                }) => {
                    self.retry_pause(retry_after, server_retry_after).await;
                }
                Progress::Ran(_) => {}
                Progress::Finished => match parents.pop() {
                    None => return current,
                    Some(mut parent) => {
                        self.resume(&mut parent, current);
                        current = parent;
                    }
                },
            }
        }
    }

    pub(crate) async fn retry_pause(&self, retry_after: Option<f64>, server_retry_after: Option<f64>) {
        if !self.config.honor_retry_after {
            return;
        }
        let server = server_retry_after.map(Duration::from_secs_f64);
        let delay = retry_delay(server, retry_after, self.config.max_retry_delay);
        if !delay.is_zero() {
            tracing::debug!(delay_ms = delay.as_millis() as u64, "waiting before retry");
            tokio::time::sleep(delay).await;
        }
    }

    fn open_child(&self, call: &ChildCall, params: &RuntimeParams, depth: usize) -> Result<Frame, RunnerError> {
        if depth + 1 > self.config.max_call_depth {
            return Err(RunnerError::CallDepthExceeded(self.config.max_call_depth));
        }
        self.new_frame(&call.workflow_id, call.inputs.clone(), params.clone(), call.role.clone())
    }

    async fn advance(&self, frame: &mut Frame) -> Progress {
        if frame.terminal.is_some() {
            return Progress::Finished;
        }
        if let Some(dependency) = frame.pending_dependencies.pop_front() {
            return Progress::Call(ChildCall {
                inputs: frame.state.inputs.clone(),
                role: FrameRole::Dependency {
                    workflow_id: dependency.clone(),
                },
                workflow_id: dependency,
            });
        }

        let document = Arc::clone(&self.document);
        let Some(workflow) = document.workflow(&frame.state.workflow_id) else {
            let message = format!("workflow not found: {}", frame.state.workflow_id);
            return Progress::Ran(frame.fail(None, message));
        };
        let Some(step) = workflow.steps.get(frame.next_index) else {
            return Progress::Ran(frame.complete());
        };

        frame.state.current_step_id = Some(step.step_id.clone());
        frame.state.status.insert(step.step_id.clone(), StepStatus::Running);
        tracing::info!(workflow_id = %workflow.workflow_id, step_id = %step.step_id, "executing step");

        if let StepTarget::Workflow(child_id) = step.target() {
            let prepared = {
                let evaluator = self.steps.evaluator(&frame.state);
                ParameterProcessor::new(evaluator, document.components.as_ref()).prepare_parameters(workflow, step)
            };
            return match prepared {
                Ok(params) => Progress::Call(ChildCall {
                    workflow_id: child_id.to_string(),
                    inputs: nested_inputs(params),
                    role: FrameRole::NestedStep {
                        step_id: step.step_id.clone(),
                    },
                }),
                Err(e) => Progress::Ran(step_error(frame, step, e.to_string())),
            };
        }

        match self.steps.execute_step(workflow, step, &frame.state).await {
            Ok(outcome) => {
                let server_retry_after = outcome.response.retry_after();
                Progress::Ran(self.apply(
                    frame,
                    workflow,
                    step,
                    outcome.success,
                    outcome.outputs,
                    outcome.next_action,
                    server_retry_after,
                ))
            }
            Err(e) => {
                tracing::error!(workflow_id = %workflow.workflow_id, step_id = %step.step_id, error = %e, "step failed to execute");
                Progress::Ran(step_error(frame, step, e.to_string()))
            }
        }
    }

    /// Record a finished child in its parent. Returns the parent's step
    /// result when the child stood for one of its steps.
    fn resume(&self, parent: &mut Frame, child: Frame) -> Option<StepRunResult> {
        match child.role.clone() {
            FrameRole::Dependency { workflow_id } => {
                if child.succeeded() {
                    parent
                        .state
                        .dependency_outputs
                        .insert(workflow_id, child.state.workflow_outputs);
                    None
                } else {
                    let message = format!("dependency '{workflow_id}' failed: {}", child.failure_message());
                    Some(parent.fail(None, message))
                }
            }
            FrameRole::NestedStep { step_id } => Some(self.resume_nested_step(parent, &step_id, child)),
            FrameRole::Root => None,
        }
    }

    fn child_failed(&self, parent: &mut Frame, role: &FrameRole, message: String) -> Option<StepRunResult> {
        match role {
            FrameRole::NestedStep { step_id } => {
                let document = Arc::clone(&self.document);
                let step = document
                    .workflow(&parent.state.workflow_id)
                    .and_then(|w| w.step(step_id));
                match step {
                    Some(step) => Some(step_error(parent, step, message)),
                    None => Some(parent.fail(Some(step_id.clone()), message)),
                }
            }
            FrameRole::Dependency { workflow_id } => {
                Some(parent.fail(None, format!("dependency '{workflow_id}' failed: {message}")))
            }
            FrameRole::Root => None,
        }
    }

    fn resume_nested_step(&self, parent: &mut Frame, step_id: &str, child: Frame) -> StepRunResult {
        let document = Arc::clone(&self.document);
        let Some(workflow) = document.workflow(&parent.state.workflow_id) else {
            return parent.fail(Some(step_id.to_string()), "workflow not found".to_string());
        };
        let Some(step) = workflow.step(step_id) else {
            return parent.fail(Some(step_id.to_string()), format!("step '{step_id}' not found"));
        };

        let outputs = match &step.outputs {
            Some(defs) => {
                let evaluator = self.steps.evaluator(&child.state);
                defs.iter()
                    .map(|(name, expr)| (name.clone(), evaluator.evaluate_template(expr)))
                    .collect()
            }
            None => child.state.workflow_outputs.clone(),
        };
        parent.state.step_outputs.insert(step_id.to_string(), outputs.clone());

        let (success, next_action) = {
            let evaluator = self.steps.evaluator(&parent.state);
            let checker = SuccessCriteriaChecker::without_response(evaluator);
            let criteria = step.success_criteria();
            let success = child.succeeded() && (criteria.is_empty() || checker.check(criteria));
            let next = ActionHandler::new(workflow, document.components.as_ref())
                .determine_next_action(step, success, &checker);
            (success, next)
        };
        tracing::debug!(step_id, child = %child.state.workflow_id, success, "nested workflow finished");
        self.apply(parent, workflow, step, success, outputs, next_action, None)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        frame: &mut Frame,
        workflow: &Workflow,
        step: &Step,
        success: bool,
        outputs: Map<String, JsonValue>,
        next_action: NextAction,
        server_retry_after: Option<Duration>,
    ) -> StepRunResult {
        let step_id = step.step_id.clone();
        frame.state.step_outputs.insert(step_id.clone(), outputs.clone());
        let status = if success { StepStatus::Success } else { StepStatus::Failure };
        frame.state.status.insert(step_id.clone(), status);
        if success {
            // A later goto back to this step starts a fresh retry budget.
            frame.retries.remove(&step_id);
        }
        self.refresh_workflow_outputs(frame, workflow);

        match next_action {
            NextAction::Continue => {
                frame.next_index = workflow.step_index(&step_id).unwrap_or(frame.next_index) + 1;
                match workflow.steps.get(frame.next_index) {
                    Some(next) => StepRunResult::StepComplete {
                        step_id,
                        success,
                        outputs,
                        next_step_id: Some(next.step_id.clone()),
                    },
                    None => frame.complete(),
                }
            }
            NextAction::End { success: true } => frame.complete(),
            NextAction::End { success: false } => {
                let message = format!("step '{step_id}' failed");
                frame.fail(Some(step_id), message)
            }
            NextAction::Goto {
                target: GotoTarget::Step(target),
            } => match workflow.step_index(&target) {
                Some(idx) => {
                    frame.next_index = idx;
                    StepRunResult::GotoStep {
                        step_id,
                        target_step_id: target,
                    }
                }
                None => {
                    let message = format!("goto target step '{target}' not found");
                    frame.fail(Some(step_id), message)
                }
            },
            NextAction::Goto {
                target: GotoTarget::Workflow(target),
            } => self.goto_workflow(frame, step_id, target, success),
            NextAction::Retry {
                retry_after,
                retry_limit,
                target,
            } => {
                let attempt = {
                    let n = frame.retries.entry(step_id.clone()).or_insert(0);
                    *n += 1;
                    *n
                };
                if attempt > retry_limit {
                    let message = format!("step '{step_id}' still failing after {retry_limit} retries");
                    return frame.fail(Some(step_id), message);
                }
                frame.state.status.insert(step_id.clone(), StepStatus::Pending);
                match target {
                    Some(GotoTarget::Workflow(target)) => return self.goto_workflow(frame, step_id, target, false),
                    Some(GotoTarget::Step(target)) => match workflow.step_index(&target) {
                        Some(idx) => frame.next_index = idx,
                        None => {
                            let message = format!("retry target step '{target}' not found");
                            return frame.fail(Some(step_id), message);
                        }
                    },
                    None => {}
                }
                tracing::info!(%step_id, attempt, retry_limit, "retrying step");
                StepRunResult::Retry {
                    step_id,
                    attempt,
                    retry_limit,
                    retry_after,
                    server_retry_after: server_retry_after.map(|d| d.as_secs_f64()),
                }
            }
        }
    }

    fn goto_workflow(&self, frame: &mut Frame, step_id: String, target: String, success: bool) -> StepRunResult {
        if self.document.workflow(&target).is_none() {
            let message = format!("goto target workflow '{target}' not found");
            return frame.fail(Some(step_id), message);
        }
        frame.finish(
            success,
            StepRunResult::GotoWorkflow {
                step_id,
                workflow_id: target,
            },
        )
    }

    /// Re-evaluate the workflow's output expressions against the current
    /// state. Evaluation is pure, so repeating it is harmless.
    fn refresh_workflow_outputs(&self, frame: &mut Frame, workflow: &Workflow) {
        let Some(defs) = &workflow.outputs else {
            return;
        };
        let outputs: Map<String, JsonValue> = {
            let evaluator = self.steps.evaluator(&frame.state);
            defs.iter()
                .map(|(name, expr)| (name.clone(), evaluator.evaluate_template(expr)))
                .collect()
        };
        frame.state.workflow_outputs = outputs;
    }
}

fn step_error(frame: &mut Frame, step: &Step, error: String) -> StepRunResult {
    frame.state.status.insert(step.step_id.clone(), StepStatus::Failure);
    let result = StepRunResult::StepError {
        step_id: step.step_id.clone(),
        error,
    };
    frame.finish(false, result)
}

/// Inputs for a nested workflow: every evaluated parameter by name, whatever
/// its declared location.
fn nested_inputs(params: PreparedParameters) -> JsonValue {
    let PreparedParameters {
        path,
        query,
        header,
        cookie,
        other,
    } = params;
    let mut inputs = Map::new();
    for bucket in [path, query, header, cookie, other] {
        inputs.extend(bucket);
    }
    JsonValue::Object(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_inputs_flatten_every_location() {
        let mut params = PreparedParameters::default();
        params.insert(None, "petId", json!(7));
        params.other.insert("limit".into(), json!(10));
        params.query.insert("sort".into(), json!("asc"));
        assert_eq!(nested_inputs(params), json!({"petId": 7, "limit": 10, "sort": "asc"}));
    }
}
