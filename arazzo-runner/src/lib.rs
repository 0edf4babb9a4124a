#![forbid(unsafe_code)]

//! Runtime engine for executing Arazzo workflows.
//!
//! Documents are parsed by `arazzo-core`; this crate resolves operations,
//! evaluates runtime expressions, injects credentials, performs HTTP calls and
//! drives the per-workflow state machine.

pub mod auth;
pub mod config;
pub mod env;
pub mod executor;
pub mod expression;
pub mod openapi;
pub mod retry;
pub mod runner;
pub mod secrets;
pub mod state;

pub use crate::config::{RunnerConfig, RuntimeParams};
pub use crate::env::{EnvSource, MapEnv, ProcessEnv};
pub use crate::executor::{HttpClient, HttpError, OperationResponse, ReqwestHttpClient};
pub use crate::expression::ExpressionEvaluator;
pub use crate::runner::{OperationRef, Runner, RunnerBuilder, RunnerError, StepRunResult};
pub use crate::state::{ExecutionState, StepStatus, WorkflowExecutionResult, WorkflowStatus};
