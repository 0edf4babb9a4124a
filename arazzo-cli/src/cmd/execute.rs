use arazzo_runner::RunnerError;

use crate::exit_codes;
use crate::output::{print_error, print_result};
use crate::{DocumentArgs, InputArgs, OutputArgs};

use super::config::{build_runner, collect_inputs, runtime_params};

pub async fn execute_cmd(
    document: &DocumentArgs,
    workflow_id: Option<&str>,
    input_args: &InputArgs,
    output: OutputArgs,
) -> i32 {
    match run(document, workflow_id, input_args, &output).await {
        Ok(code) | Err(code) => code,
    }
}

async fn run(
    document: &DocumentArgs,
    workflow_id: Option<&str>,
    input_args: &InputArgs,
    output: &OutputArgs,
) -> Result<i32, i32> {
    let inputs = collect_inputs(input_args, output)?;
    let params = runtime_params(input_args, output)?;
    let mut runner = build_runner(document, output).await?;

    let workflow_id = match workflow_id {
        Some(id) => id.to_string(),
        None => match runner.document().workflows.as_slice() {
            [only] => only.workflow_id.clone(),
            workflows => {
                let ids: Vec<&str> = workflows.iter().map(|w| w.workflow_id.as_str()).collect();
                print_error(
                    output.format,
                    output.quiet,
                    &format!("--workflow is required; available: {}", ids.join(", ")),
                );
                return Err(exit_codes::USAGE_ERROR);
            }
        },
    };

    match runner.execute_workflow(&workflow_id, inputs, params).await {
        Ok(result) => {
            print_result(output.format, output.quiet, &result);
            if result.is_success() {
                Ok(exit_codes::SUCCESS)
            } else {
                Ok(exit_codes::WORKFLOW_FAILED)
            }
        }
        Err(e @ RunnerError::WorkflowNotFound(_)) => {
            print_error(output.format, output.quiet, &e.to_string());
            Err(exit_codes::USAGE_ERROR)
        }
        Err(e) => {
            print_error(output.format, output.quiet, &e.to_string());
            Err(exit_codes::RUNTIME_ERROR)
        }
    }
}
