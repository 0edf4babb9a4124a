use std::path::PathBuf;

use clap::Args;

use crate::output::OutputFormat;

#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// The Arazzo document and where its OpenAPI sources come from.
#[derive(Debug, Args, Clone)]
pub struct DocumentArgs {
    /// Arazzo document (JSON or YAML).
    pub path: PathBuf,
    /// Override the location of a source description.
    #[arg(long = "openapi", value_name = "NAME=PATH")]
    pub openapi_sources: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct InputArgs {
    /// Inputs as inline JSON, or `@file` to read JSON/YAML from a file.
    #[arg(long, value_name = "JSON|@FILE")]
    pub inputs: Option<String>,
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set_inputs: Vec<String>,
    /// Server variable override, by variable name or full env var name.
    #[arg(long = "server-var", value_name = "NAME=VALUE")]
    pub server_vars: Vec<String>,
}
