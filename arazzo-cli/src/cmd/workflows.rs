use arazzo_runner::auth::identify_auth_workflows;
use serde::Serialize;

use crate::exit_codes;
use crate::output::{print_result, OutputFormat};
use crate::{DocumentArgs, OutputArgs};

use super::config::load_document;

#[derive(Serialize)]
struct WorkflowInfo {
    workflow_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    step_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<String>,
    is_auth: bool,
}

#[derive(Serialize)]
struct WorkflowsResult {
    workflows: Vec<WorkflowInfo>,
}

pub async fn workflows_cmd(document: &DocumentArgs, output: OutputArgs) -> i32 {
    let doc = match load_document(document, &output) {
        Ok(d) => d,
        Err(code) => return code,
    };
    let auth = identify_auth_workflows(&doc);

    let workflows: Vec<WorkflowInfo> = doc
        .workflows
        .iter()
        .map(|w| WorkflowInfo {
            workflow_id: w.workflow_id.clone(),
            summary: w.summary.clone(),
            step_count: w.steps.len(),
            depends_on: w.depends_on().to_vec(),
            is_auth: auth.iter().any(|a| a.workflow_id == w.workflow_id),
        })
        .collect();
    let result = WorkflowsResult { workflows };

    if output.format == OutputFormat::Text && !output.quiet {
        println!("Workflows in {}:", document.path.display());
        for w in &result.workflows {
            let marker = if w.is_auth { " [auth]" } else { "" };
            println!("  - {} ({} steps){marker}", w.workflow_id, w.step_count);
            if let Some(s) = &w.summary {
                println!("    {s}");
            }
            if !w.depends_on.is_empty() {
                println!("    depends on: {}", w.depends_on.join(", "));
            }
        }
    } else {
        print_result(output.format, output.quiet, &result);
    }

    exit_codes::SUCCESS
}
