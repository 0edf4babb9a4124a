use clap::Subcommand;

use crate::args::*;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a workflow to completion.
    Execute {
        #[command(flatten)]
        document: DocumentArgs,
        #[arg(long)]
        workflow: Option<String>,
        #[command(flatten)]
        inputs: InputArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Call a single operation outside any workflow.
    Operation {
        #[command(flatten)]
        document: DocumentArgs,
        #[arg(long, conflicts_with = "operation_path", required_unless_present = "operation_path")]
        operation_id: Option<String>,
        #[arg(long)]
        operation_path: Option<String>,
        #[command(flatten)]
        inputs: InputArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Print the environment variables read for credentials and servers.
    EnvMappings {
        #[command(flatten)]
        document: DocumentArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// List the workflows of a document.
    Workflows {
        #[command(flatten)]
        document: DocumentArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
}
