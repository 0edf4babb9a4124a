use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::openapi::refs::deref;

/// A loaded OpenAPI (3.x or Swagger 2.0) document.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OpenApiDoc {
    /// Original location (URL or file path) used to load.
    pub source_url: String,
    /// Parsed document as JSON value (works for both JSON and YAML inputs).
    pub raw: JsonValue,
}

/// Source description name to its OpenAPI document.
pub type OpenApiSources = BTreeMap<String, OpenApiDoc>;

impl OpenApiDoc {
    pub fn new(source_url: impl Into<String>, raw: JsonValue) -> Self {
        Self {
            source_url: source_url.into(),
            raw,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.raw.pointer("/info/title").and_then(|v| v.as_str())
    }

    pub fn is_swagger2(&self) -> bool {
        self.raw.get("swagger").is_some()
    }

    pub fn paths(&self) -> Option<&serde_json::Map<String, JsonValue>> {
        self.raw.get("paths")?.as_object()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OpenApiParam {
    pub name: String,
    pub location: OpenApiParamLocation,
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpenApiParamLocation {
    Path,
    Query,
    Header,
    Cookie,
    /// Swagger 2.0 `in: body`.
    Body,
    /// Swagger 2.0 `in: formData`.
    FormData,
}

/// What an operation accepts as request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBodySpec {
    pub required: bool,
    /// Declared media types, `application/json` first when present.
    pub content_types: Vec<String>,
}

impl RequestBodySpec {
    pub fn preferred_content_type(&self) -> Option<&str> {
        self.content_types.first().map(String::as_str)
    }
}

pub(crate) fn location_from_str(s: &str) -> Option<OpenApiParamLocation> {
    match s {
        "path" => Some(OpenApiParamLocation::Path),
        "query" => Some(OpenApiParamLocation::Query),
        "header" => Some(OpenApiParamLocation::Header),
        "cookie" => Some(OpenApiParamLocation::Cookie),
        "body" => Some(OpenApiParamLocation::Body),
        "formData" => Some(OpenApiParamLocation::FormData),
        _ => None,
    }
}

pub(crate) fn method_keys() -> &'static [&'static str] {
    &[
        "get", "put", "post", "delete", "options", "head", "patch", "trace",
    ]
}

pub(crate) fn extract_parameter_obj(p: &JsonValue) -> Option<OpenApiParam> {
    let name = p.get("name").and_then(|v| v.as_str())?;
    let loc = p
        .get("in")
        .and_then(|v| v.as_str())
        .and_then(location_from_str)?;
    let mut required = p.get("required").and_then(|v| v.as_bool()).unwrap_or(false);
    if loc == OpenApiParamLocation::Path {
        required = true;
    }
    Some(OpenApiParam {
        name: name.to_string(),
        location: loc,
        required,
    })
}

/// Parameters of `parameters` arrays with `$ref`s resolved. Unresolvable
/// entries are logged and skipped.
pub(crate) fn collect_parameters(doc: &JsonValue, parameters: Option<&JsonValue>) -> Vec<OpenApiParam> {
    let Some(arr) = parameters.and_then(|p| p.as_array()) else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(|p| match deref(doc, p) {
            Ok(resolved) => extract_parameter_obj(resolved),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unresolvable parameter");
                None
            }
        })
        .collect()
}

/// Merge path-item and operation parameters. An operation parameter replaces
/// a path-item parameter with the same name and location.
pub(crate) fn merge_params(path_level: Vec<OpenApiParam>, op_level: Vec<OpenApiParam>) -> Vec<OpenApiParam> {
    let mut out = path_level;
    for p in op_level {
        match out.iter_mut().find(|e| e.name == p.name && e.location == p.location) {
            Some(existing) => *existing = p,
            None => out.push(p),
        }
    }
    out
}

pub(crate) fn request_body_spec(
    doc: &JsonValue,
    operation: &JsonValue,
    params: &[OpenApiParam],
) -> Option<RequestBodySpec> {
    if let Some(rb) = operation.get("requestBody") {
        let rb = match deref(doc, rb) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "unresolvable requestBody");
                rb
            }
        };
        let mut content_types: Vec<String> = rb
            .get("content")
            .and_then(|c| c.as_object())
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default();
        content_types.sort_by_key(|ct| (!ct.contains("json"), ct.clone()));
        return Some(RequestBodySpec {
            required: rb.get("required").and_then(|v| v.as_bool()).unwrap_or(false),
            content_types,
        });
    }

    // Swagger 2.0: a body parameter or formData parameters.
    let consumes = operation
        .get("consumes")
        .or_else(|| doc.get("consumes"))
        .and_then(|c| c.as_array())
        .map(|c| c.iter().filter_map(|v| v.as_str().map(str::to_string)).collect::<Vec<_>>())
        .unwrap_or_default();
    if let Some(body) = params.iter().find(|p| p.location == OpenApiParamLocation::Body) {
        let content_types = if consumes.is_empty() {
            vec!["application/json".to_string()]
        } else {
            consumes
        };
        return Some(RequestBodySpec {
            required: body.required,
            content_types,
        });
    }
    let form: Vec<_> = params
        .iter()
        .filter(|p| p.location == OpenApiParamLocation::FormData)
        .collect();
    if !form.is_empty() {
        let content_type = consumes
            .into_iter()
            .find(|c| c.contains("form"))
            .unwrap_or_else(|| "application/x-www-form-urlencoded".to_string());
        return Some(RequestBodySpec {
            required: form.iter().any(|p| p.required),
            content_types: vec![content_type],
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_params_override_path_params() {
        let doc = json!({"components": {"parameters": {"limit": {"name": "limit", "in": "query", "required": true}}}});
        let path_level = collect_parameters(
            &doc,
            Some(&json!([{"name": "id", "in": "path"}, {"name": "limit", "in": "query"}])),
        );
        let op_level = collect_parameters(&doc, Some(&json!([{"$ref": "#/components/parameters/limit"}])));
        let merged = merge_params(path_level, op_level);
        assert_eq!(merged.len(), 2);
        assert!(merged[0].required, "path params are always required");
        assert!(merged[1].required);
    }

    #[test]
    fn request_body_prefers_json() {
        let op = json!({"requestBody": {"required": true, "content": {"text/plain": {}, "application/json": {}}}});
        let spec = request_body_spec(&json!({}), &op, &[]).unwrap();
        assert!(spec.required);
        assert_eq!(spec.preferred_content_type(), Some("application/json"));
    }

    #[test]
    fn swagger2_body_param_is_a_request_body() {
        let params = vec![OpenApiParam {
            name: "pet".into(),
            location: OpenApiParamLocation::Body,
            required: true,
        }];
        let spec = request_body_spec(&json!({"swagger": "2.0"}), &json!({}), &params).unwrap();
        assert_eq!(spec.content_types, vec!["application/json".to_string()]);
    }
}
