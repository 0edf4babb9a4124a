use arazzo_runner::auth::EnvMappings;

use crate::exit_codes;
use crate::output::{print_result, OutputFormat};
use crate::{DocumentArgs, OutputArgs};

use super::config::{load_document, load_openapi_sources};

pub async fn env_mappings_cmd(document: &DocumentArgs, output: OutputArgs) -> i32 {
    let sources = match load_document(document, &output) {
        Ok(doc) => load_openapi_sources(document, &doc, &output).await,
        Err(code) => Err(code),
    };
    let mappings = match sources {
        Ok(sources) => EnvMappings::build(&sources),
        Err(code) => return code,
    };

    if output.format == OutputFormat::Text && !output.quiet {
        print_section("Credentials", &mappings.auth);
        print_section("Server variables", &mappings.servers);
    } else {
        print_result(output.format, output.quiet, &mappings);
    }
    exit_codes::SUCCESS
}

fn print_section(title: &str, value: &serde_json::Value) {
    println!("{title}:");
    let mut vars = Vec::new();
    collect_names(value, &mut vars);
    if vars.is_empty() {
        println!("  (none)");
    }
    for var in vars {
        println!("  {var}");
    }
}

/// Leaf strings of a mapping tree are the variable names.
fn collect_names(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => out.push(s.clone()),
        serde_json::Value::Object(map) => map.values().for_each(|v| collect_names(v, out)),
        _ => {}
    }
}
