use arazzo_runner::OperationRef;

use crate::exit_codes;
use crate::output::{print_error, print_result};
use crate::{DocumentArgs, InputArgs, OutputArgs};

use super::config::{build_runner, collect_inputs, runtime_params};

/// Call one operation directly. A non-2xx response exits with
/// [`exit_codes::WORKFLOW_FAILED`] after printing it.
pub async fn operation_cmd(
    document: &DocumentArgs,
    operation_id: Option<String>,
    operation_path: Option<String>,
    input_args: &InputArgs,
    output: OutputArgs,
) -> i32 {
    let operation = match (operation_id, operation_path) {
        (Some(id), _) => OperationRef::Id(id),
        (None, Some(path)) => OperationRef::Path(path),
        (None, None) => {
            print_error(output.format, output.quiet, "--operation-id or --operation-path is required");
            return exit_codes::USAGE_ERROR;
        }
    };

    let prepared = async {
        let inputs = collect_inputs(input_args, &output)?;
        let params = runtime_params(input_args, &output)?;
        let runner = build_runner(document, &output).await?;
        Ok::<_, i32>((inputs, params, runner))
    };
    let (inputs, params, runner) = match prepared.await {
        Ok(v) => v,
        Err(code) => return code,
    };
    let inputs = inputs.as_object().cloned().unwrap_or_default();

    match runner.execute_operation(&inputs, &operation, &params).await {
        Ok(response) => {
            print_result(output.format, output.quiet, &response);
            if response.is_success() {
                exit_codes::SUCCESS
            } else {
                exit_codes::WORKFLOW_FAILED
            }
        }
        Err(e) => {
            print_error(output.format, output.quiet, &e.to_string());
            exit_codes::RUNTIME_ERROR
        }
    }
}
