use std::sync::Arc;

use arazzo_core::expressions::{escape_token, parse_template, Segment};
use arazzo_core::types::{ArazzoDocument, Step, StepTarget, Workflow};
use serde_json::{Map, Value as JsonValue};
use tracing::Instrument;

use crate::config::RuntimeParams;
use crate::executor::actions::{ActionHandler, NextAction};
use crate::executor::criteria::SuccessCriteriaChecker;
use crate::executor::outputs::extract_outputs;
use crate::executor::params::{prepare_operation_parameters, ParameterError, ParameterProcessor};
use crate::executor::request::{ExecutedRequest, HttpExecutor, RequestError};
use crate::executor::response::OperationResponse;
use crate::expression::{stringify, ExpressionEvaluator};
use crate::openapi::{parse_operation_path, FinderError, OperationFinder, OperationInfo, ServerError, ServerProcessor};
use crate::state::ExecutionState;

/// How a direct operation call names its operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationRef {
    Id(String),
    /// An Arazzo `operationPath`, e.g. `{$sourceDescriptions.api.url}#/paths/~1pets/get`.
    Path(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Finder(#[from] FinderError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("invalid operationPath '{path}': {message}")]
    InvalidOperationPath { path: String, message: String },
    #[error("step '{0}' names no operationId, operationPath or workflowId")]
    NoTarget(String),
    #[error("step '{0}' invokes a workflow and must be run by the runner")]
    NestedWorkflow(String),
}

/// Result of one operation step.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StepOutcome {
    pub success: bool,
    pub outputs: Map<String, JsonValue>,
    pub response: OperationResponse,
    pub next_action: NextAction,
}

/// Executes single operation steps and direct operation calls.
pub struct StepExecutor {
    document: Arc<ArazzoDocument>,
    finder: OperationFinder,
    servers: ServerProcessor,
    http: HttpExecutor,
    source_descriptions: JsonValue,
    components: JsonValue,
}

impl StepExecutor {
    pub fn new(
        document: Arc<ArazzoDocument>,
        finder: OperationFinder,
        servers: ServerProcessor,
        http: HttpExecutor,
    ) -> Self {
        let source_descriptions = JsonValue::Object(
            document
                .source_descriptions
                .iter()
                .map(|sd| (sd.name.clone(), serde_json::to_value(sd).unwrap_or(JsonValue::Null)))
                .collect(),
        );
        let components = document
            .components
            .as_ref()
            .and_then(|c| serde_json::to_value(c).ok())
            .unwrap_or(JsonValue::Null);
        Self {
            document,
            finder,
            servers,
            http,
            source_descriptions,
            components,
        }
    }

    pub fn finder(&self) -> &OperationFinder {
        &self.finder
    }

    pub fn document(&self) -> &ArazzoDocument {
        &self.document
    }

    /// An evaluator over `state` that also sees source descriptions and components.
    pub fn evaluator<'a>(&'a self, state: &'a ExecutionState) -> ExpressionEvaluator<'a> {
        ExpressionEvaluator::new(state)
            .with_source_descriptions(&self.source_descriptions)
            .with_components(&self.components)
    }

    pub async fn execute_step(
        &self,
        workflow: &Workflow,
        step: &Step,
        state: &ExecutionState,
    ) -> Result<StepOutcome, StepError> {
        let span = tracing::info_span!("step", workflow_id = %workflow.workflow_id, step_id = %step.step_id);
        self.execute_step_inner(workflow, step, state).instrument(span).await
    }

    async fn execute_step_inner(
        &self,
        workflow: &Workflow,
        step: &Step,
        state: &ExecutionState,
    ) -> Result<StepOutcome, StepError> {
        let evaluator = self.evaluator(state);
        let op = match step.target() {
            StepTarget::OperationId(id) => self.finder.find_by_id(id)?,
            StepTarget::OperationPath(path) => self.find_by_operation_path(&render_operation_path(path, &evaluator))?,
            StepTarget::Workflow(_) => return Err(StepError::NestedWorkflow(step.step_id.clone())),
            StepTarget::None => return Err(StepError::NoTarget(step.step_id.clone())),
        };
        tracing::debug!(source = %op.source, method = %op.method, path = %op.path, "resolved operation");

        let processor = ParameterProcessor::new(evaluator, self.document.components.as_ref());
        let mut params = processor.prepare_parameters(workflow, step)?;
        let declared = self.finder.parameters(&op);
        params.place_by_name(&declared);
        if !params.other.is_empty() {
            tracing::debug!(names = ?params.other.keys().collect::<Vec<_>>(), "parameters without a request location");
        }

        let mut body = match &step.request_body {
            Some(rb) => processor.prepare_request_body(rb)?,
            None => None,
        };
        if let Some(b) = body.as_mut().filter(|b| b.content_type.is_none()) {
            b.content_type = self
                .finder
                .request_body(&op, &declared)
                .and_then(|spec| spec.preferred_content_type().map(str::to_string));
        }

        let executed = self.send(&op, &params, body.as_ref(), &state.runtime_params).await?;
        let response = executed.response;
        let extra = response.eval_context(&executed.url, &executed.method);
        let evaluator = evaluator.with_extra(&extra);

        let checker = SuccessCriteriaChecker::new(evaluator, &response);
        let success = checker.check(step.success_criteria());
        let outputs = match &step.outputs {
            Some(defs) => extract_outputs(defs, &response, &evaluator),
            None => Map::new(),
        };
        let next_action = ActionHandler::new(workflow, self.document.components.as_ref())
            .determine_next_action(step, success, &checker);
        tracing::debug!(status = response.status_code, success, action = ?next_action.action_type(), "step finished");

        Ok(StepOutcome {
            success,
            outputs,
            response,
            next_action,
        })
    }

    /// Call one operation directly with raw inputs mapped onto its declared
    /// parameters and body.
    pub async fn execute_operation(
        &self,
        inputs: &Map<String, JsonValue>,
        operation: &OperationRef,
        runtime_params: &RuntimeParams,
    ) -> Result<ExecutedRequest, StepError> {
        let op = match operation {
            OperationRef::Id(id) => self.finder.find_by_id(id)?,
            OperationRef::Path(path) => self.find_by_operation_path(path)?,
        };
        let declared = self.finder.parameters(&op);
        let body_spec = self.finder.request_body(&op, &declared);
        let (params, body) = prepare_operation_parameters(&declared, &op.path, body_spec.as_ref(), inputs)?;
        self.send(&op, &params, body.as_ref(), runtime_params).await
    }

    fn find_by_operation_path(&self, path: &str) -> Result<OperationInfo, StepError> {
        let parsed = parse_operation_path(path).map_err(|e| StepError::InvalidOperationPath {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        Ok(self.finder.find_by_path(&parsed.source, &parsed.pointer)?)
    }

    async fn send(
        &self,
        op: &OperationInfo,
        params: &crate::executor::params::PreparedParameters,
        body: Option<&crate::executor::params::PreparedBody>,
        runtime_params: &RuntimeParams,
    ) -> Result<ExecutedRequest, StepError> {
        let url = self.servers.resolve_server_params(&op.url, runtime_params, &op.source)?;
        let security = self.finder.extract_security_requirements(op);
        Ok(self
            .http
            .execute_request(&op.method, &url, params, body, &security, Some(&op.source))
            .await?)
    }
}

/// Substitute `{$expr}` tokens in the pointer part of an `operationPath`.
/// Values are escaped as JSON pointer tokens.
fn render_operation_path(path: &str, evaluator: &ExpressionEvaluator<'_>) -> String {
    let Some((source, fragment)) = path.split_once('#') else {
        return path.to_string();
    };
    let template = match parse_template(fragment) {
        Ok(t) if t.has_expressions() => t,
        _ => return path.to_string(),
    };
    let mut out = format!("{source}#");
    for seg in &template.segments {
        match seg {
            Segment::Literal(l) => out.push_str(l),
            Segment::Expr(e) => out.push_str(&escape_token(&stringify(&evaluator.evaluate(e)))),
        }
    }
    out
}
