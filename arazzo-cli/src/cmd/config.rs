use std::collections::BTreeMap;

use arazzo_core::types::ArazzoDocument;
use arazzo_runner::openapi::{load_arazzo_file, load_sources, LoadError, OpenApiSources};
use arazzo_runner::{Runner, RuntimeParams};
use serde_json::{Map, Value as JsonValue};

use crate::exit_codes;
use crate::output::print_error;
use crate::{DocumentArgs, InputArgs, OutputArgs};

/// Failures are reported here; callers just return the exit code.
pub type CmdResult<T> = Result<T, i32>;

fn fail<T>(output: &OutputArgs, code: i32, message: impl AsRef<str>) -> CmdResult<T> {
    print_error(output.format, output.quiet, message.as_ref());
    Err(code)
}

/// `--inputs` is either inline JSON or `@path` to a JSON/YAML file.
pub fn load_inputs(raw: Option<&str>, output: &OutputArgs) -> CmdResult<Option<JsonValue>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let Some(path) = raw.strip_prefix('@') else {
        return match serde_json::from_str(raw) {
            Ok(v) => Ok(Some(v)),
            Err(e) => fail(output, exit_codes::USAGE_ERROR, format!("--inputs is not valid JSON: {e}")),
        };
    };
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return fail(output, exit_codes::USAGE_ERROR, format!("failed to read inputs from {path}: {e}")),
    };
    if let Ok(v) = serde_json::from_str(&content) {
        return Ok(Some(v));
    }
    if let Ok(v) = serde_yaml::from_str(&content) {
        return Ok(Some(v));
    }
    fail(output, exit_codes::USAGE_ERROR, "inputs file is neither valid JSON nor YAML")
}

/// Apply `--set key=value` pairs. Values that parse as JSON keep their type.
pub fn merge_set_inputs(inputs: &mut Option<JsonValue>, set_inputs: &[String], output: &OutputArgs) -> CmdResult<()> {
    if set_inputs.is_empty() {
        return Ok(());
    }
    let Some(map) = inputs.get_or_insert_with(|| JsonValue::Object(Map::new())).as_object_mut() else {
        return fail(output, exit_codes::USAGE_ERROR, "--set requires object inputs");
    };
    for (k, v) in parse_pairs(set_inputs, "--set", output)? {
        let value = serde_json::from_str(&v).unwrap_or(JsonValue::String(v));
        map.insert(k, value);
    }
    Ok(())
}

/// Inputs as a JSON object, `{}` when none were given.
pub fn collect_inputs(args: &InputArgs, output: &OutputArgs) -> CmdResult<JsonValue> {
    let mut inputs = load_inputs(args.inputs.as_deref(), output)?;
    merge_set_inputs(&mut inputs, &args.set_inputs, output)?;
    match inputs {
        None => Ok(JsonValue::Object(Map::new())),
        Some(v @ JsonValue::Object(_)) => Ok(v),
        Some(_) => fail(output, exit_codes::USAGE_ERROR, "inputs must be a JSON object"),
    }
}

pub fn runtime_params(args: &InputArgs, output: &OutputArgs) -> CmdResult<RuntimeParams> {
    Ok(RuntimeParams {
        servers: parse_pairs(&args.server_vars, "--server-var", output)?,
    })
}

fn parse_pairs(pairs: &[String], flag: &str, output: &OutputArgs) -> CmdResult<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((k, v)) if !k.is_empty() => {
                out.insert(k.to_string(), v.to_string());
            }
            _ => return fail(output, exit_codes::USAGE_ERROR, format!("{flag} expects NAME=VALUE, got '{pair}'")),
        }
    }
    Ok(out)
}

pub fn load_document(args: &DocumentArgs, output: &OutputArgs) -> CmdResult<ArazzoDocument> {
    load_arazzo_file(&args.path).or_else(|e| fail(output, exit_codes::USAGE_ERROR, e.to_string()))
}

/// Load the OpenAPI sources of `document`, honoring `--openapi` overrides.
pub async fn load_openapi_sources(
    args: &DocumentArgs,
    document: &ArazzoDocument,
    output: &OutputArgs,
) -> CmdResult<OpenApiSources> {
    let overrides = parse_pairs(&args.openapi_sources, "--openapi", output)?;
    let client = reqwest::Client::new();
    let base = args.path.to_string_lossy();
    match load_sources(&client, document, Some(&base), &overrides).await {
        Ok(sources) => Ok(sources),
        Err(e @ LoadError::Fetch { .. }) => fail(output, exit_codes::RUNTIME_ERROR, e.to_string()),
        Err(e) => fail(output, exit_codes::USAGE_ERROR, e.to_string()),
    }
}

/// A runner over the process environment and a real HTTP client.
pub async fn build_runner(args: &DocumentArgs, output: &OutputArgs) -> CmdResult<Runner> {
    let document = load_document(args, output)?;
    let sources = load_openapi_sources(args, &document, output).await?;
    tracing::debug!(path = %args.path.display(), sources = sources.len(), "document loaded");
    Ok(Runner::builder(document, sources).build())
}
