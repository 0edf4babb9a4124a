use arazzo_core::types::{
    Components, Criterion, FailureAction, FailureActionOrReusable, FailureActionType, Step,
    SuccessAction, SuccessActionOrReusable, SuccessActionType, Workflow,
};

use crate::executor::criteria::SuccessCriteriaChecker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Continue,
    End,
    Goto,
    Retry,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GotoTarget {
    Step(String),
    Workflow(String),
}

/// What the runner does after a step.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NextAction {
    Continue,
    End {
        success: bool,
    },
    Goto {
        target: GotoTarget,
    },
    Retry {
        retry_after: Option<f64>,
        retry_limit: u32,
        /// Where to go instead of re-running the step; `None` re-runs it.
        target: Option<GotoTarget>,
    },
}

impl NextAction {
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::Continue => ActionType::Continue,
            Self::End { .. } => ActionType::End,
            Self::Goto { .. } => ActionType::Goto,
            Self::Retry { .. } => ActionType::Retry,
        }
    }
}

/// Picks the next action from a step's `onSuccess`/`onFailure` lists, falling
/// back to the workflow's `successActions`/`failureActions`.
pub struct ActionHandler<'a> {
    workflow: &'a Workflow,
    components: Option<&'a Components>,
}

impl<'a> ActionHandler<'a> {
    pub fn new(workflow: &'a Workflow, components: Option<&'a Components>) -> Self {
        Self {
            workflow,
            components,
        }
    }

    pub fn determine_next_action(&self, step: &Step, success: bool, checker: &SuccessCriteriaChecker<'_>) -> NextAction {
        if success {
            self.on_success(step, checker)
        } else {
            self.on_failure(step, checker)
        }
    }

    fn on_success(&self, step: &Step, checker: &SuccessCriteriaChecker<'_>) -> NextAction {
        let actions = non_empty(step.on_success.as_deref())
            .or_else(|| non_empty(self.workflow.success_actions.as_deref()))
            .unwrap_or(&[]);
        for action in actions {
            let Some(action) = self.resolve_success(action) else {
                continue;
            };
            if !criteria_hold(action.criteria(), checker) {
                continue;
            }
            match action.action_type {
                SuccessActionType::End => return NextAction::End { success: true },
                SuccessActionType::Goto => match goto_target(&action.step_id, &action.workflow_id) {
                    Some(target) => return NextAction::Goto { target },
                    None => tracing::warn!(action = %action.name, "goto action names neither stepId nor workflowId"),
                },
            }
        }
        NextAction::Continue
    }

    fn on_failure(&self, step: &Step, checker: &SuccessCriteriaChecker<'_>) -> NextAction {
        let actions = non_empty(step.on_failure.as_deref())
            .or_else(|| non_empty(self.workflow.failure_actions.as_deref()))
            .unwrap_or(&[]);
        for action in actions {
            let Some(action) = self.resolve_failure(action) else {
                continue;
            };
            if !criteria_hold(action.criteria(), checker) {
                continue;
            }
            match action.action_type {
                FailureActionType::End => return NextAction::End { success: false },
                FailureActionType::Goto => match goto_target(&action.step_id, &action.workflow_id) {
                    Some(target) => return NextAction::Goto { target },
                    None => tracing::warn!(action = %action.name, "goto action names neither stepId nor workflowId"),
                },
                FailureActionType::Retry => {
                    return NextAction::Retry {
                        retry_after: action.retry_after_seconds,
                        retry_limit: action.effective_retry_limit(),
                        target: goto_target(&action.step_id, &action.workflow_id),
                    }
                }
            }
        }
        NextAction::End { success: false }
    }

    fn resolve_success<'s>(&self, action: &'s SuccessActionOrReusable) -> Option<&'s SuccessAction>
    where
        'a: 's,
    {
        match action {
            SuccessActionOrReusable::Action(a) => Some(a),
            SuccessActionOrReusable::Reusable(r) => {
                let found = r
                    .component_name("successActions")
                    .and_then(|name| self.components?.success_action(name));
                if found.is_none() {
                    tracing::warn!(reference = %r.reference, "unknown reusable success action");
                }
                found
            }
        }
    }

    fn resolve_failure<'s>(&self, action: &'s FailureActionOrReusable) -> Option<&'s FailureAction>
    where
        'a: 's,
    {
        match action {
            FailureActionOrReusable::Action(a) => Some(a),
            FailureActionOrReusable::Reusable(r) => {
                let found = r
                    .component_name("failureActions")
                    .and_then(|name| self.components?.failure_action(name));
                if found.is_none() {
                    tracing::warn!(reference = %r.reference, "unknown reusable failure action");
                }
                found
            }
        }
    }
}

fn non_empty<T>(items: Option<&[T]>) -> Option<&[T]> {
    items.filter(|i| !i.is_empty())
}

/// Actions without criteria always apply.
fn criteria_hold(criteria: &[Criterion], checker: &SuccessCriteriaChecker<'_>) -> bool {
    criteria.is_empty() || checker.check(criteria)
}

fn goto_target(step_id: &Option<String>, workflow_id: &Option<String>) -> Option<GotoTarget> {
    match (step_id, workflow_id) {
        (Some(s), _) => Some(GotoTarget::Step(s.clone())),
        (None, Some(w)) => Some(GotoTarget::Workflow(w.clone())),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use serde_json::json;

    use crate::executor::response::OperationResponse;
    use crate::expression::ExpressionEvaluator;
    use crate::state::ExecutionState;
    use crate::RuntimeParams;

    fn workflow(value: serde_json::Value) -> Workflow {
        serde_json::from_value(value).unwrap()
    }

    fn decide(wf: &Workflow, status: u16, success: bool) -> NextAction {
        let resp = OperationResponse {
            status_code: status,
            headers: BTreeMap::new(),
            body: json!({}),
        };
        let state = ExecutionState::new("wf", ["s"], json!({}), RuntimeParams::default());
        let extra = resp.eval_context("https://example.com", "GET");
        let checker = SuccessCriteriaChecker::new(ExpressionEvaluator::new(&state).with_extra(&extra), &resp);
        ActionHandler::new(wf, None).determine_next_action(&wf.steps[0], success, &checker)
    }

    #[test]
    fn retry_is_chosen_after_skipped_end() {
        let wf = workflow(json!({
            "workflowId": "wf",
            "steps": [{
                "stepId": "s",
                "operationId": "op",
                "onFailure": [
                    {"name": "giveUp", "type": "end", "criteria": [{"condition": "$statusCode == 400"}]},
                    {"name": "again", "type": "retry", "retryAfter": 2, "retryLimit": 3,
                     "criteria": [{"condition": "$statusCode == 503"}]}
                ]
            }]
        }));
        assert_eq!(
            decide(&wf, 503, false),
            NextAction::Retry {
                retry_after: Some(2.0),
                retry_limit: 3,
                target: None
            }
        );
        assert_eq!(decide(&wf, 400, false), NextAction::End { success: false });
        assert_eq!(decide(&wf, 500, false), NextAction::End { success: false });
    }

    #[test]
    fn workflow_actions_apply_when_step_declares_none() {
        let wf = workflow(json!({
            "workflowId": "wf",
            "successActions": [{"name": "jump", "type": "goto", "stepId": "done"}],
            "steps": [{"stepId": "s", "operationId": "op"}, {"stepId": "done", "operationId": "op2"}]
        }));
        assert_eq!(
            decide(&wf, 200, true),
            NextAction::Goto {
                target: GotoTarget::Step("done".into())
            }
        );
        assert_eq!(decide(&wf, 200, true).action_type(), ActionType::Goto);
    }

    #[test]
    fn success_without_actions_continues() {
        let wf = workflow(json!({"workflowId": "wf", "steps": [{"stepId": "s", "operationId": "op"}]}));
        assert_eq!(decide(&wf, 200, true), NextAction::Continue);
    }
}
