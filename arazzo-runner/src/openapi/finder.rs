use std::sync::Arc;

use arazzo_core::expressions::JsonPointer;
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::auth::SecurityOption;
use crate::openapi::model::{
    collect_parameters, merge_params, method_keys, request_body_spec, OpenApiDoc, OpenApiParam,
    OpenApiSources, RequestBodySpec,
};
use crate::openapi::op_path::SourceRef;

/// A located OpenAPI operation.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OperationInfo {
    pub source: String,
    pub path: String,
    /// Upper-case HTTP method.
    pub method: String,
    /// Server base joined with `path`; may still hold `{var}` placeholders.
    pub url: String,
    pub operation: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip)]
    pub path_item: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FinderError {
    #[error("operation not found: {0}")]
    OperationNotFound(String),
    #[error("source '{source_name}' has no usable server URL: {message}")]
    ServerConfig { source_name: String, message: String },
    #[error("unknown source description: {0}")]
    UnknownSource(String),
    #[error("invalid operationPath '{path}': {message}")]
    InvalidOperationPath { path: String, message: String },
}

/// Locates operations across the loaded OpenAPI sources.
#[derive(Debug, Clone)]
pub struct OperationFinder {
    sources: Arc<OpenApiSources>,
}

struct Candidate<'d> {
    source: &'d str,
    doc: &'d OpenApiDoc,
    path: &'d str,
    method: &'static str,
    path_item: &'d JsonValue,
    operation: &'d JsonValue,
}

impl OperationFinder {
    pub fn new(sources: Arc<OpenApiSources>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &OpenApiSources {
        &self.sources
    }

    /// Find by `operationId`, optionally qualified as
    /// `$sourceDescriptions.<name>.<operationId>`.
    pub fn find_by_id(&self, operation_id: &str) -> Result<OperationInfo, FinderError> {
        let (scope, op_id) = split_qualified(operation_id);
        if let Some(name) = scope {
            if !self.sources.contains_key(name) {
                return Err(FinderError::UnknownSource(name.to_string()));
            }
        }

        let mut matches = Vec::new();
        for (name, doc) in self.sources.iter().filter(|(n, _)| scope.map_or(true, |s| s == n.as_str())) {
            for c in operations(name, doc) {
                if c.operation.get("operationId").and_then(|v| v.as_str()) == Some(op_id) {
                    matches.push(c);
                }
            }
        }
        if matches.len() > 1 {
            let sources: Vec<_> = matches.iter().map(|c| c.source).collect();
            tracing::warn!(operation_id = op_id, ?sources, "operationId is ambiguous; using the first match");
        }
        let first = matches
            .into_iter()
            .next()
            .ok_or_else(|| FinderError::OperationNotFound(operation_id.to_string()))?;
        build_info(first)
    }

    /// Find by a concrete request path and method. Literal segments in `path`
    /// may fill `{var}` segments of the declared path; among several template
    /// matches the one with the fewest templated segments wins.
    pub fn find_by_http_path_and_method(&self, path: &str, method: &str) -> Result<OperationInfo, FinderError> {
        let method = method.to_ascii_lowercase();
        let request_path = request_path(path);

        let mut best: Option<(usize, Candidate<'_>)> = None;
        for (name, doc) in self.sources.iter() {
            let base_path = server_base_path(doc);
            for c in operations(name, doc).into_iter().filter(|c| c.method == method) {
                let stripped = base_path
                    .as_deref()
                    .and_then(|b| request_path.strip_prefix(b))
                    .filter(|rest| rest.starts_with('/'));
                let score = [Some(request_path.as_str()), stripped]
                    .into_iter()
                    .flatten()
                    .filter_map(|p| match_template(c.path, p))
                    .min();
                if let Some(score) = score {
                    if score == 0 {
                        return build_info(c);
                    }
                    if best.as_ref().map_or(true, |(s, _)| score < *s) {
                        best = Some((score, c));
                    }
                }
            }
        }
        best.map(|(_, c)| build_info(c))
            .unwrap_or_else(|| Err(FinderError::OperationNotFound(format!("{} {path}", method.to_uppercase()))))
    }

    /// Find by an `operationPath` pointer (`/paths/<escaped path>/<method>`).
    /// A pointer whose path is a concrete instance of a templated path still
    /// matches that path.
    pub fn find_by_path(&self, source: &SourceRef, pointer: &JsonPointer) -> Result<OperationInfo, FinderError> {
        let (name, doc) = self.source_by_ref(source)?;
        let invalid = |message: &str| FinderError::InvalidOperationPath {
            path: pointer.as_str().to_string(),
            message: message.to_string(),
        };

        let tokens = pointer.tokens();
        let [first, path, method, ..] = tokens.as_slice() else {
            return Err(invalid("pointer must address /paths/<path>/<method>"));
        };
        if first != "paths" {
            return Err(invalid("pointer must start with /paths"));
        }
        let method = method.to_ascii_lowercase();
        let wanted = normalize_path(path);

        let mut best: Option<(usize, Candidate<'_>)> = None;
        for c in operations(name, doc).into_iter().filter(|c| c.method == method) {
            if normalize_path(c.path) == wanted {
                return build_info(c);
            }
            if let Some(score) = match_template(c.path, &wanted) {
                if best.as_ref().map_or(true, |(s, _)| score < *s) {
                    best = Some((score, c));
                }
            }
        }
        best.map(|(_, c)| build_info(c)).unwrap_or_else(|| {
            Err(FinderError::OperationNotFound(format!("{name}#{}", pointer.as_str())))
        })
    }

    /// Security options in effect for an operation: operation level, then
    /// path-item level, then document level. An empty list means no auth.
    pub fn extract_security_requirements(&self, op: &OperationInfo) -> Vec<SecurityOption> {
        let global = self.sources.get(&op.source).and_then(|d| d.raw.get("security"));
        op.operation
            .get("security")
            .or_else(|| op.path_item.get("security"))
            .or(global)
            .map(SecurityOption::parse_list)
            .unwrap_or_default()
    }

    /// Declared parameters, path-item level merged with operation level.
    pub fn parameters(&self, op: &OperationInfo) -> Vec<OpenApiParam> {
        let Some(doc) = self.sources.get(&op.source) else {
            return Vec::new();
        };
        merge_params(
            collect_parameters(&doc.raw, op.path_item.get("parameters")),
            collect_parameters(&doc.raw, op.operation.get("parameters")),
        )
    }

    pub fn request_body(&self, op: &OperationInfo, params: &[OpenApiParam]) -> Option<RequestBodySpec> {
        let doc = self.sources.get(&op.source)?;
        request_body_spec(&doc.raw, &op.operation, params)
    }

    fn source_by_ref(&self, source: &SourceRef) -> Result<(&str, &OpenApiDoc), FinderError> {
        let found = match source {
            SourceRef::Name(n) => self.sources.get_key_value(n),
            SourceRef::Url(u) => self
                .sources
                .iter()
                .find(|(_, d)| &d.source_url == u)
                .or_else(|| {
                    // Loaded from a local copy: match on the file name.
                    let file = u.rsplit('/').next().unwrap_or(u);
                    self.sources.iter().find(|(_, d)| d.source_url.rsplit('/').next() == Some(file))
                }),
        };
        let found = found.or_else(|| {
            (self.sources.len() == 1)
                .then(|| self.sources.iter().next())
                .flatten()
        });
        found.map(|(n, d)| (n.as_str(), d)).ok_or_else(|| {
            FinderError::UnknownSource(match source {
                SourceRef::Name(n) | SourceRef::Url(n) => n.clone(),
            })
        })
    }
}

fn split_qualified(operation_id: &str) -> (Option<&str>, &str) {
    let trimmed = operation_id.trim();
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(trimmed);
    // `$sourceDescriptions.<name>.<operationId>`
    match inner
        .strip_prefix("$sourceDescriptions.")
        .and_then(|rest| rest.split_once('.'))
    {
        Some((name, op)) => (Some(name), op),
        None => (None, trimmed),
    }
}

fn operations<'d>(source: &'d str, doc: &'d OpenApiDoc) -> Vec<Candidate<'d>> {
    let mut out = Vec::new();
    let Some(paths) = doc.paths() else {
        return out;
    };
    for (path, item) in paths {
        for method in method_keys() {
            if let Some(op) = item.get(*method).filter(|v| v.is_object()) {
                out.push(Candidate {
                    source,
                    doc,
                    path,
                    method,
                    path_item: item,
                    operation: op,
                });
            }
        }
    }
    out
}

fn build_info(c: Candidate<'_>) -> Result<OperationInfo, FinderError> {
    let base = base_url(c.source, c.doc, c.operation, c.path_item)?;
    Ok(OperationInfo {
        source: c.source.to_string(),
        path: c.path.to_string(),
        method: c.method.to_uppercase(),
        url: join_url(&base, c.path),
        operation: c.operation.clone(),
        operation_id: c
            .operation
            .get("operationId")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        path_item: c.path_item.clone(),
    })
}

fn servers_first_url(v: &JsonValue) -> Option<String> {
    let servers = v.get("servers")?.as_array()?;
    let first = servers.first()?.as_object()?;
    first.get("url")?.as_str().map(|s| s.to_string())
}

/// Base URL: operation servers, then path-item servers, then document servers
/// (OpenAPI 3), or `schemes`/`host`/`basePath` (Swagger 2.0).
fn base_url(
    source: &str,
    doc: &OpenApiDoc,
    operation: &JsonValue,
    path_item: &JsonValue,
) -> Result<String, FinderError> {
    let config_err = |message: &str| FinderError::ServerConfig {
        source_name: source.to_string(),
        message: message.to_string(),
    };

    if doc.is_swagger2() {
        let host = doc
            .raw
            .get("host")
            .and_then(|v| v.as_str())
            .ok_or_else(|| config_err("swagger document has no host"))?;
        let scheme = doc
            .raw
            .get("schemes")
            .and_then(|s| s.as_array())
            .and_then(|s| s.iter().filter_map(|v| v.as_str()).find(|s| *s == "https").or_else(|| s.first()?.as_str()))
            .unwrap_or("https");
        let base_path = doc.raw.get("basePath").and_then(|v| v.as_str()).unwrap_or("");
        return Ok(format!("{scheme}://{host}{base_path}"));
    }

    let url = servers_first_url(operation)
        .or_else(|| servers_first_url(path_item))
        .or_else(|| servers_first_url(&doc.raw))
        .ok_or_else(|| config_err("no servers declared"))?;
    if url.trim().is_empty() {
        return Err(config_err("servers[0].url is empty"));
    }
    if url.contains("://") || url.starts_with('{') {
        return Ok(url);
    }
    // Relative server URL: resolve against the document's own URL when known.
    match url::Url::parse(&doc.source_url).and_then(|base| base.join(&url)) {
        Ok(joined) if doc.source_url.starts_with("http") => Ok(joined.to_string()),
        _ => {
            tracing::debug!(source, server = %url, "relative server URL left unresolved");
            Ok(url)
        }
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn server_base_path(doc: &OpenApiDoc) -> Option<String> {
    if doc.is_swagger2() {
        return doc.raw.get("basePath").and_then(|v| v.as_str()).map(|s| s.trim_end_matches('/').to_string());
    }
    let url = servers_first_url(&doc.raw)?;
    let path = match url.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|i| rest[i..].to_string())?,
        None => url,
    };
    let path = path.trim_end_matches('/').to_string();
    (!path.is_empty()).then_some(path)
}

fn request_path(path: &str) -> String {
    let path = match url::Url::parse(path) {
        Ok(u) if u.has_host() => u.path().to_string(),
        _ => path.to_string(),
    };
    let path = path.split(['?', '#']).next().unwrap_or_default();
    normalize_path(path)
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Number of templated segments used when `template` matches `path`.
fn match_template(template: &str, path: &str) -> Option<usize> {
    let template = normalize_path(template);
    let path = normalize_path(path);
    let tsegs: Vec<&str> = template.split('/').collect();
    let psegs: Vec<&str> = path.split('/').collect();
    if tsegs.len() != psegs.len() {
        return None;
    }
    let mut templated = 0;
    for (ts, ps) in tsegs.iter().zip(&psegs) {
        if ts == ps {
            continue;
        }
        if !ts.contains('{') || ps.is_empty() {
            return None;
        }
        if !segment_regex(ts)?.is_match(ps) {
            return None;
        }
        templated += 1;
    }
    Some(templated)
}

fn segment_regex(segment: &str) -> Option<Regex> {
    let mut pattern = String::from("^");
    let mut rest = segment;
    while let Some(open) = rest.find('{') {
        pattern.push_str(&regex::escape(&rest[..open]));
        let close = rest[open..].find('}')? + open;
        pattern.push_str("[^/]+");
        rest = &rest[close + 1..];
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');
    Regex::new(&pattern).ok()
}
