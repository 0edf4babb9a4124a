use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

mod args;
mod cmd;
mod commands;
mod exit_codes;
mod output;

pub use args::*;
use commands::Command;

#[derive(Debug, Parser)]
#[command(name = "arazzo", version, about = "Arazzo workflow runner")]
struct Cli {
    /// Log more (`-v` debug, `-vv` trace). `RUST_LOG` applies otherwise.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {e}");
            std::process::exit(exit_codes::RUNTIME_ERROR);
        }
    };

    let exit_code = rt.block_on(run_command(cli.command));
    std::process::exit(exit_code);
}

async fn run_command(command: Command) -> i32 {
    match command {
        Command::Execute {
            document,
            workflow,
            inputs,
            output,
        } => cmd::execute::execute_cmd(&document, workflow.as_deref(), &inputs, output).await,
        Command::Operation {
            document,
            operation_id,
            operation_path,
            inputs,
            output,
        } => cmd::operation::operation_cmd(&document, operation_id, operation_path, &inputs, output).await,
        Command::EnvMappings { document, output } => cmd::env_mappings::env_mappings_cmd(&document, output).await,
        Command::Workflows { document, output } => cmd::workflows::workflows_cmd(&document, output).await,
    }
}
