//! Per-step execution: parameter and body preparation, HTTP calls, success
//! criteria, output extraction and next-action selection.

mod actions;
mod criteria;
mod http;
mod outputs;
mod params;
mod request;
mod response;
mod step;

pub use actions::{ActionHandler, ActionType, GotoTarget, NextAction};
pub use criteria::{CriteriaError, SuccessCriteriaChecker};
pub use http::{HttpClient, HttpError, HttpRequestParts, HttpResponseParts, ReqwestHttpClient};
pub use outputs::extract_outputs;
pub use params::{
    prepare_operation_parameters, ParameterError, ParameterProcessor, PreparedBody, PreparedParameters,
};
pub use request::{build_request, ExecutedRequest, HttpExecutor, RequestError};
pub use response::OperationResponse;
pub use step::{OperationRef, StepError, StepExecutor, StepOutcome};
