//! Workflow orchestration.
//!
//! A [`Runner`] owns one Arazzo document plus its OpenAPI sources and drives
//! executions either step by step ([`Runner::start_workflow`] then
//! [`Runner::execute_next_step`]) or to completion
//! ([`Runner::execute_workflow`]). Dependencies and nested `workflowId` steps
//! run on an explicit frame stack bounded by
//! [`RunnerConfig::max_call_depth`].

mod driver;
mod result;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use arazzo_core::types::ArazzoDocument;
use serde_json::{Map, Value as JsonValue};
use tracing::Instrument;

use crate::auth::{
    identify_auth_workflows, AuthProcessor, AuthReport, AuthWorkflow, CredentialProvider, DefaultCredentialProvider,
    EnvMappings,
};
use crate::config::{RunnerConfig, RuntimeParams};
use crate::env::{EnvSource, ProcessEnv};
use crate::executor::{HttpClient, HttpExecutor, OperationResponse, ReqwestHttpClient, StepError, StepExecutor};
use crate::openapi::{load_arazzo_file, LoadError, OpenApiSources, OperationFinder, ServerProcessor};
use crate::state::{ExecutionState, WorkflowExecutionResult, WorkflowStatus};

use self::driver::{Engine, Frame, FrameRole};

pub use self::result::StepRunResult;
pub use crate::executor::OperationRef;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),
    #[error("execution not found: {0}")]
    ExecutionNotFound(String),
    #[error("dependency '{dependency}' of workflow '{workflow_id}' failed: {message}")]
    DependencyFailed {
        workflow_id: String,
        dependency: String,
        message: String,
    },
    #[error("maximum workflow call depth of {0} exceeded")]
    CallDepthExceeded(usize),
    #[error(transparent)]
    Step(#[from] StepError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Configures and builds a [`Runner`].
pub struct RunnerBuilder {
    document: ArazzoDocument,
    sources: OpenApiSources,
    config: RunnerConfig,
    http: Option<Arc<dyn HttpClient>>,
    env: Option<Arc<dyn EnvSource>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl RunnerBuilder {
    pub fn new(document: ArazzoDocument, sources: OpenApiSources) -> Self {
        Self {
            document,
            sources,
            config: RunnerConfig::default(),
            http: None,
            env: None,
            credentials: None,
        }
    }

    /// Read the Arazzo document from `path`. OpenAPI sources are supplied
    /// separately since they may need to be fetched.
    pub fn from_file(path: impl AsRef<Path>, sources: OpenApiSources) -> Result<Self, RunnerError> {
        Ok(Self::new(load_arazzo_file(path.as_ref())?, sources))
    }

    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http = Some(client);
        self
    }

    /// Where credentials and server variables are read from. Defaults to the
    /// process environment.
    pub fn env(mut self, env: Arc<dyn EnvSource>) -> Self {
        self.env = Some(env);
        self
    }

    /// Replace the environment-backed credential lookup.
    pub fn credential_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    pub fn build(self) -> Runner {
        let config = self.config;
        let http = self
            .http
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new(&config.user_agent)));
        let env = self.env.unwrap_or_else(|| Arc::new(ProcessEnv));
        let credentials = self.credentials.unwrap_or_else(|| {
            Arc::new(
                DefaultCredentialProvider::new(&self.sources, Arc::clone(&env), Arc::clone(&http))
                    .with_limits(config.http_timeout, config.max_response_bytes),
            )
        });

        let sources = Arc::new(self.sources);
        let document = Arc::new(self.document);
        let steps = StepExecutor::new(
            Arc::clone(&document),
            OperationFinder::new(Arc::clone(&sources)),
            ServerProcessor::new(Arc::clone(&sources), env),
            HttpExecutor::new(http, credentials, config.http_timeout, config.max_response_bytes),
        );
        Runner {
            engine: Engine {
                document,
                config,
                steps,
            },
            sources,
            executions: HashMap::new(),
        }
    }
}

/// Executes the workflows of one Arazzo document.
pub struct Runner {
    engine: Engine,
    sources: Arc<OpenApiSources>,
    /// Live executions keyed by execution id.
    executions: HashMap<String, Frame>,
}

impl Runner {
    pub fn builder(document: ArazzoDocument, sources: OpenApiSources) -> RunnerBuilder {
        RunnerBuilder::new(document, sources)
    }

    pub fn document(&self) -> &ArazzoDocument {
        &self.engine.document
    }

    pub fn sources(&self) -> &OpenApiSources {
        &self.sources
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.engine.config
    }

    /// Create an execution for `workflow_id` and return its id. Dependencies
    /// declared in `dependsOn` run to completion first; if any of them fails
    /// no execution is created.
    pub async fn start_workflow(
        &mut self,
        workflow_id: &str,
        inputs: JsonValue,
        runtime_params: RuntimeParams,
    ) -> Result<String, RunnerError> {
        let mut frame = self
            .engine
            .new_frame(workflow_id, inputs, runtime_params, FrameRole::Root)?;
        self.engine.run_dependencies(&mut frame).await?;

        let execution_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(%execution_id, workflow_id, "workflow started");
        self.executions.insert(execution_id.clone(), frame);
        Ok(execution_id)
    }

    /// Run the next step of an execution. Step and workflow failures are
    /// reported in the result; only an unknown execution id is an error.
    pub async fn execute_next_step(&mut self, execution_id: &str) -> Result<StepRunResult, RunnerError> {
        let frame = self
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| RunnerError::ExecutionNotFound(execution_id.to_string()))?;
        Ok(self.engine.step_root(frame).await)
    }

    /// Current state of a live execution.
    pub fn execution_state(&self, execution_id: &str) -> Option<&ExecutionState> {
        self.executions.get(execution_id).map(|f| &f.state)
    }

    /// Drop a live execution, returning its final state.
    pub fn finish_execution(&mut self, execution_id: &str) -> Option<ExecutionState> {
        self.executions.remove(execution_id).map(|f| f.state)
    }

    /// Run `workflow_id` to completion, following retries and jumps to other
    /// workflows.
    pub async fn execute_workflow(
        &mut self,
        workflow_id: &str,
        inputs: JsonValue,
        runtime_params: RuntimeParams,
    ) -> Result<WorkflowExecutionResult, RunnerError> {
        let span = tracing::info_span!("workflow", workflow_id);
        self.execute_workflow_inner(workflow_id, inputs, runtime_params)
            .instrument(span)
            .await
    }

    async fn execute_workflow_inner(
        &mut self,
        workflow_id: &str,
        inputs: JsonValue,
        runtime_params: RuntimeParams,
    ) -> Result<WorkflowExecutionResult, RunnerError> {
        let mut current = workflow_id.to_string();
        let mut hops = 0usize;
        loop {
            let execution_id = match self.start_workflow(&current, inputs.clone(), runtime_params.clone()).await {
                Ok(id) => id,
                Err(e @ (RunnerError::DependencyFailed { .. } | RunnerError::CallDepthExceeded(_))) => {
                    tracing::warn!(workflow_id = %current, error = %e, "workflow could not start");
                    return Ok(WorkflowExecutionResult {
                        status: WorkflowStatus::Error,
                        workflow_id: current,
                        outputs: Map::new(),
                        step_outputs: Default::default(),
                        inputs,
                        error: Some(e.to_string()),
                    });
                }
                Err(e) => return Err(e),
            };

            let outcome = loop {
                let result = self.execute_next_step(&execution_id).await?;
                match result {
                    StepRunResult::StepComplete { .. } | StepRunResult::GotoStep { .. } => {}
                    StepRunResult::Retry {
                        retry_after,
                        server_retry_after,
                        ..
                    } => self.engine.retry_pause(retry_after, server_retry_after).await,
                    terminal => break terminal,
                }
            };

            let state = self
                .finish_execution(&execution_id)
                .ok_or_else(|| RunnerError::ExecutionNotFound(execution_id.clone()))?;
            let (status, error) = match outcome {
                StepRunResult::GotoWorkflow { workflow_id: next, .. } => {
                    hops += 1;
                    if hops > self.engine.config.max_call_depth {
                        let message = format!("more than {} workflow jumps", self.engine.config.max_call_depth);
                        (WorkflowStatus::Error, Some(message))
                    } else {
                        tracing::info!(from = %current, to = %next, "jumping to workflow");
                        current = next;
                        continue;
                    }
                }
                StepRunResult::WorkflowComplete { .. } => (WorkflowStatus::WorkflowComplete, None),
                StepRunResult::Error { error, .. } | StepRunResult::StepError { error, .. } => {
                    (WorkflowStatus::Error, Some(error))
                }
                other => (WorkflowStatus::Error, Some(format!("unexpected step result: {other:?}"))),
            };
            tracing::info!(workflow_id = %state.workflow_id, ?status, "workflow finished");
            return Ok(WorkflowExecutionResult {
                status,
                workflow_id: state.workflow_id,
                outputs: state.workflow_outputs,
                step_outputs: state.step_outputs,
                inputs: state.inputs,
                error,
            });
        }
    }

    /// Call a single operation outside any workflow. `inputs` are matched to
    /// the operation's declared parameters by name; a `body` entry (or any
    /// leftover inputs) becomes the request body.
    pub async fn execute_operation(
        &self,
        inputs: &Map<String, JsonValue>,
        operation: &OperationRef,
        runtime_params: &RuntimeParams,
    ) -> Result<OperationResponse, RunnerError> {
        let executed = self
            .engine
            .steps
            .execute_operation(inputs, operation, runtime_params)
            .await?;
        tracing::info!(method = %executed.method, url = %executed.url, status = executed.response.status_code, "operation executed");
        Ok(executed.response)
    }

    /// Environment variable names the runner reads for credentials and
    /// server variables.
    pub fn get_env_mappings(&self) -> EnvMappings {
        EnvMappings::build(&self.sources)
    }

    /// Workflows that look like they obtain credentials.
    pub fn auth_workflows(&self) -> Vec<AuthWorkflow> {
        identify_auth_workflows(&self.engine.document)
    }

    /// Security requirements, env mappings and auth workflows in one report.
    pub fn auth_report(&self) -> AuthReport {
        AuthProcessor.process(&self.sources, &[self.document()])
    }
}
