use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::auth::{api_title_prefix, sanitize_env_name};
use crate::config::RuntimeParams;
use crate::env::EnvSource;
use crate::openapi::model::{OpenApiDoc, OpenApiSources};

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ServerVariable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One entry of an OpenAPI `servers` list.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ServerConfiguration {
    pub url_template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub variables: BTreeMap<String, ServerVariable>,
    pub api_title_prefix: String,
}

impl ServerConfiguration {
    pub fn new(url_template: impl Into<String>, api_title_prefix: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            description: None,
            variables: BTreeMap::new(),
            api_title_prefix: api_title_prefix.into(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, var: ServerVariable) -> Self {
        self.variables.insert(name.into(), var);
        self
    }

    /// Server configurations of a source, in declaration order.
    pub fn from_doc(source_name: &str, doc: &OpenApiDoc) -> Vec<Self> {
        let prefix = api_title_prefix(doc.title(), source_name);
        let Some(servers) = doc.raw.get("servers").and_then(|s| s.as_array()) else {
            return Vec::new();
        };
        servers
            .iter()
            .filter_map(|s| {
                let url = s.get("url")?.as_str()?;
                let variables = s
                    .get("variables")
                    .and_then(|v| v.as_object())
                    .map(|vars| {
                        vars.iter()
                            .map(|(name, v)| (name.clone(), parse_variable(v)))
                            .collect()
                    })
                    .unwrap_or_default();
                Some(Self {
                    url_template: url.to_string(),
                    description: s.get("description").and_then(|d| d.as_str()).map(str::to_string),
                    variables,
                    api_title_prefix: prefix.clone(),
                })
            })
            .collect()
    }

    /// `<PREFIX>_OAK_SERVER_<VAR>`
    pub fn env_var_name(&self, variable: &str) -> String {
        format!("{}_OAK_SERVER_{}", self.api_title_prefix, sanitize_env_name(variable))
    }

    /// Placeholder names in the URL template, in order of appearance.
    pub fn placeholders(&self) -> Vec<String> {
        placeholders(&self.url_template)
    }
}

fn parse_variable(v: &JsonValue) -> ServerVariable {
    let as_string = |v: &JsonValue| match v {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Null => None,
        other => Some(other.to_string()),
    };
    ServerVariable {
        default: v.get("default").and_then(as_string),
        enum_values: v
            .get("enum")
            .and_then(|e| e.as_array())
            .map(|e| e.iter().filter_map(as_string).collect())
            .unwrap_or_default(),
        description: v.get("description").and_then(|d| d.as_str()).map(str::to_string),
    }
}

fn placeholders(template: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        let name = &rest[open + 1..open + close];
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
        rest = &rest[open + close + 1..];
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServerError {
    #[error("server variable '{variable}' has no value (set {env_var} or pass it as a runtime parameter)")]
    MissingServerVariable { variable: String, env_var: String },
    #[error("source '{0}' declares no servers")]
    NoServerConfiguration(String),
    #[error("unknown source description: {0}")]
    UnknownSource(String),
}

/// Resolves templated server URLs.
#[derive(Clone)]
pub struct ServerProcessor {
    sources: Arc<OpenApiSources>,
    env: Arc<dyn EnvSource>,
}

impl ServerProcessor {
    pub fn new(sources: Arc<OpenApiSources>, env: Arc<dyn EnvSource>) -> Self {
        Self { sources, env }
    }

    /// Substitute every `{var}` of the server template. Each variable is taken
    /// from the runtime parameters, then the environment, then the declared
    /// default.
    pub fn resolve_server_base_url(
        &self,
        config: &ServerConfiguration,
        runtime_params: &RuntimeParams,
    ) -> Result<String, ServerError> {
        let mut url = config.url_template.clone();
        for name in config.placeholders() {
            let env_var = config.env_var_name(&name);
            let declared = config.variables.get(&name);
            let value = runtime_params
                .servers
                .get(&env_var)
                .or_else(|| runtime_params.servers.get(&name))
                .cloned()
                .or_else(|| self.env.var(&env_var))
                .or_else(|| declared.and_then(|v| v.default.clone()))
                .ok_or_else(|| ServerError::MissingServerVariable {
                    variable: name.clone(),
                    env_var: env_var.clone(),
                })?;
            if let Some(var) = declared.filter(|v| !v.enum_values.is_empty()) {
                if !var.enum_values.contains(&value) {
                    tracing::warn!(variable = %name, %value, allowed = ?var.enum_values, "server variable value is not in its enum");
                }
            }
            url = url.replace(&format!("{{{name}}}"), &value);
        }
        Ok(url)
    }

    /// Resolve server placeholders in an operation URL built from the
    /// source's server template. URLs whose server part is already concrete
    /// are returned unchanged.
    pub fn resolve_server_params(
        &self,
        url: &str,
        runtime_params: &RuntimeParams,
        source_name: &str,
    ) -> Result<String, ServerError> {
        if !url.contains('{') {
            return Ok(url.to_string());
        }
        let doc = self
            .sources
            .get(source_name)
            .ok_or_else(|| ServerError::UnknownSource(source_name.to_string()))?;
        let configs = ServerConfiguration::from_doc(source_name, doc);

        if let Some(config) = configs.iter().find(|c| {
            let t = c.url_template.trim_end_matches('/');
            t.contains('{') && url.starts_with(t)
        }) {
            let template = config.url_template.trim_end_matches('/');
            let base = self.resolve_server_base_url(config, runtime_params)?;
            return Ok(format!("{}{}", base.trim_end_matches('/'), &url[template.len()..]));
        }

        let Some((origin, rest)) = split_origin(url) else {
            return Ok(url.to_string());
        };
        if !origin.contains('{') {
            return Ok(url.to_string());
        }
        let config = configs
            .first()
            .ok_or_else(|| ServerError::NoServerConfiguration(source_name.to_string()))?;
        let base = self.resolve_server_base_url(config, runtime_params)?;
        let resolved_origin = split_origin(&base).map(|(o, _)| o).unwrap_or(&base);
        Ok(format!("{resolved_origin}{rest}"))
    }

    /// Environment variable names of every server variable, per source.
    pub fn server_env_vars(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        server_env_vars(&self.sources)
    }
}

/// Server variable name to environment variable name, per source. Sources
/// without templated servers are omitted.
pub fn server_env_vars(sources: &OpenApiSources) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for (name, doc) in sources {
        let mut vars = BTreeMap::new();
        for config in ServerConfiguration::from_doc(name, doc) {
            for var in config.placeholders() {
                vars.entry(var.clone()).or_insert_with(|| config.env_var_name(&var));
            }
        }
        if !vars.is_empty() {
            out.insert(name.clone(), vars);
        }
    }
    out
}

/// Split `scheme://authority` from the rest of a URL.
fn split_origin(url: &str) -> Option<(&str, &str)> {
    let scheme_end = url.find("://")? + 3;
    let path_start = url[scheme_end..].find('/').map(|i| i + scheme_end).unwrap_or(url.len());
    Some((&url[..path_start], &url[path_start..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnv;
    use serde_json::json;

    fn config() -> ServerConfiguration {
        ServerConfiguration::new("https://{region}.api.example.com/{version}", "ACME")
            .with_variable(
                "region",
                ServerVariable {
                    enum_values: vec!["eu".into(), "us".into()],
                    ..Default::default()
                },
            )
            .with_variable(
                "version",
                ServerVariable {
                    default: Some("v1".into()),
                    ..Default::default()
                },
            )
    }

    fn processor(env: MapEnv) -> ServerProcessor {
        let mut sources = OpenApiSources::new();
        sources.insert(
            "acme".into(),
            OpenApiDoc::new(
                "acme.yaml",
                json!({
                    "info": {"title": "Acme Cloud API"},
                    "servers": [{
                        "url": "https://{region}.api.example.com/{version}",
                        "variables": {"region": {"default": "us"}, "version": {"default": "v1"}}
                    }]
                }),
            ),
        );
        ServerProcessor::new(Arc::new(sources), Arc::new(env))
    }

    #[test]
    fn env_var_names_use_title_prefix() {
        assert_eq!(config().env_var_name("region"), "ACME_OAK_SERVER_REGION");
        assert_eq!(config().placeholders(), vec!["region", "version"]);
    }

    #[test]
    fn variable_precedence() {
        let c = config();
        let none = RuntimeParams::default();

        // No runtime value, no env, no default.
        let err = processor(MapEnv::new()).resolve_server_base_url(&c, &none).unwrap_err();
        assert_eq!(
            err,
            ServerError::MissingServerVariable {
                variable: "region".into(),
                env_var: "ACME_OAK_SERVER_REGION".into()
            }
        );

        // Env fills the variable without default; the other falls back to its default.
        let env = MapEnv::new().with("ACME_OAK_SERVER_REGION", "eu");
        assert_eq!(
            processor(env.clone()).resolve_server_base_url(&c, &none).unwrap(),
            "https://eu.api.example.com/v1"
        );

        // Env beats default; runtime beats env.
        let env = env.with("ACME_OAK_SERVER_VERSION", "v2");
        let params = RuntimeParams::default().with_server_var("ACME_OAK_SERVER_REGION", "us");
        assert_eq!(
            processor(env).resolve_server_base_url(&c, &params).unwrap(),
            "https://us.api.example.com/v2"
        );
    }

    #[test]
    fn resolves_operation_urls() {
        let p = processor(MapEnv::new());
        let params = RuntimeParams::default().with_server_var("region", "eu");
        assert_eq!(
            p.resolve_server_params("https://{region}.api.example.com/{version}/pets/{petId}", &params, "acme")
                .unwrap(),
            "https://eu.api.example.com/v1/pets/{petId}"
        );
        assert_eq!(
            p.resolve_server_params("https://fixed.example.com/pets/{petId}", &params, "acme").unwrap(),
            "https://fixed.example.com/pets/{petId}"
        );
        assert_eq!(
            p.server_env_vars()["acme"]["region"],
            "ACME_OAK_SERVER_REGION"
        );
    }
}
