use std::collections::{BTreeMap, BTreeSet};

use arazzo_core::expressions::{is_runtime_expr, parse_template, JsonPointer, Segment};
use arazzo_core::types::{
    Components, Parameter, ParameterLocation, ParameterOrReusable, RequestBody, Step, Workflow,
};
use serde_json::{Map, Value as JsonValue};

use crate::expression::{stringify, ExpressionEvaluator};
use crate::openapi::{OpenApiParam, OpenApiParamLocation, RequestBodySpec};

/// Evaluated request parameters bucketed by location. Parameters without an
/// HTTP location land in `other` (nested workflow inputs, or values placed by
/// name once the operation is known).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct PreparedParameters {
    pub path: BTreeMap<String, JsonValue>,
    pub query: BTreeMap<String, JsonValue>,
    pub header: BTreeMap<String, JsonValue>,
    pub cookie: BTreeMap<String, JsonValue>,
    pub other: BTreeMap<String, JsonValue>,
}

impl PreparedParameters {
    pub fn insert(&mut self, location: Option<&ParameterLocation>, name: impl Into<String>, value: JsonValue) {
        let bucket = match location {
            Some(ParameterLocation::Path) => &mut self.path,
            Some(ParameterLocation::Query) => &mut self.query,
            Some(ParameterLocation::Header) => &mut self.header,
            Some(ParameterLocation::Cookie) => &mut self.cookie,
            Some(ParameterLocation::Other) | None => &mut self.other,
        };
        bucket.insert(name.into(), value);
    }

    /// Move `other` entries whose name matches a declared operation parameter
    /// into that parameter's location.
    pub fn place_by_name(&mut self, declared: &[OpenApiParam]) {
        let names: Vec<String> = self.other.keys().cloned().collect();
        for name in names {
            let Some(param) = declared.iter().find(|p| p.name == name) else {
                continue;
            };
            let bucket = match param.location {
                OpenApiParamLocation::Path => &mut self.path,
                OpenApiParamLocation::Query => &mut self.query,
                OpenApiParamLocation::Header => &mut self.header,
                OpenApiParamLocation::Cookie => &mut self.cookie,
                OpenApiParamLocation::Body | OpenApiParamLocation::FormData => continue,
            };
            if let Some(v) = self.other.remove(&name) {
                bucket.insert(name, v);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PreparedBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub payload: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParameterError {
    #[error("missing required {location} parameter '{name}'")]
    MissingRequiredParameter { name: String, location: String },
    #[error("operation requires a request body but none was provided")]
    MissingRequiredBody,
    #[error("unknown reusable parameter '{0}'")]
    UnknownComponent(String),
    #[error("invalid replacement target '{target}': {message}")]
    InvalidReplacementTarget { target: String, message: String },
}

/// Builds request parameters and bodies from step definitions or raw inputs.
pub struct ParameterProcessor<'a> {
    evaluator: ExpressionEvaluator<'a>,
    components: Option<&'a Components>,
}

impl<'a> ParameterProcessor<'a> {
    pub fn new(evaluator: ExpressionEvaluator<'a>, components: Option<&'a Components>) -> Self {
        Self {
            evaluator,
            components,
        }
    }

    /// Evaluate workflow-level and step parameters. A step parameter replaces
    /// a workflow parameter with the same name and location.
    pub fn prepare_parameters(&self, workflow: &Workflow, step: &Step) -> Result<PreparedParameters, ParameterError> {
        let mut resolved: Vec<Parameter> = Vec::new();
        let workflow_params = workflow.parameters.as_deref().unwrap_or(&[]);
        for p in workflow_params.iter().chain(step.parameters()) {
            let param = self.resolve_parameter(p)?;
            match resolved.iter_mut().find(|e| e.name == param.name && e.r#in == param.r#in) {
                Some(existing) => *existing = param,
                None => resolved.push(param),
            }
        }

        let mut out = PreparedParameters::default();
        for p in resolved {
            let value = self.evaluator.process_value(&p.value);
            out.insert(p.r#in.as_ref(), p.name, value);
        }
        Ok(out)
    }

    fn resolve_parameter(&self, p: &ParameterOrReusable) -> Result<Parameter, ParameterError> {
        match p {
            ParameterOrReusable::Parameter(p) => Ok(p.clone()),
            ParameterOrReusable::Reusable(r) => {
                let name = r
                    .component_name("parameters")
                    .ok_or_else(|| ParameterError::UnknownComponent(r.reference.clone()))?;
                let mut param = self
                    .components
                    .and_then(|c| c.parameter(name))
                    .cloned()
                    .ok_or_else(|| ParameterError::UnknownComponent(name.to_string()))?;
                if let Some(v) = &r.value {
                    param.value = v.clone();
                }
                Ok(param)
            }
        }
    }

    /// Evaluate a step request body, then apply its replacements.
    pub fn prepare_request_body(&self, body: &RequestBody) -> Result<Option<PreparedBody>, ParameterError> {
        if body.is_empty() {
            return Ok(None);
        }
        let mut payload = match &body.payload {
            Some(p) => self.evaluate_payload(p),
            None => JsonValue::Null,
        };

        for r in body.replacements() {
            let value = self.evaluator.process_value(&r.value);
            let pointer = replacement_pointer(&r.target)?;
            pointer
                .assign(&mut payload, value)
                .map_err(|e| ParameterError::InvalidReplacementTarget {
                    target: r.target.clone(),
                    message: e.to_string(),
                })?;
        }

        Ok(Some(PreparedBody {
            content_type: body.content_type.clone(),
            payload,
        }))
    }

    fn evaluate_payload(&self, payload: &JsonValue) -> JsonValue {
        let JsonValue::String(s) = payload else {
            return self.evaluator.process_value(payload);
        };
        if is_runtime_expr(s) {
            return self.evaluator.evaluate(s);
        }
        if let Ok(parsed) = serde_json::from_str::<JsonValue>(s) {
            if parsed.is_object() || parsed.is_array() {
                return self.evaluator.process_value(&parsed);
            }
        }
        let template = match parse_template(s) {
            Ok(t) if t.has_expressions() => t,
            _ => return payload.clone(),
        };
        if let Some(expr) = template.single_expr() {
            return self.evaluator.evaluate(expr);
        }

        let values: Vec<JsonValue> = template
            .segments
            .iter()
            .filter_map(|seg| match seg {
                Segment::Expr(e) => Some(self.evaluator.evaluate(e)),
                Segment::Literal(_) => None,
            })
            .collect();
        let null = JsonValue::Null;
        let render = |as_json: bool| {
            let mut values = values.iter();
            let mut out = String::new();
            for seg in &template.segments {
                match seg {
                    Segment::Literal(l) => out.push_str(l),
                    Segment::Expr(_) => {
                        let v = values.next().unwrap_or(&null);
                        if as_json {
                            out.push_str(&v.to_string());
                        } else {
                            out.push_str(&stringify(v));
                        }
                    }
                }
            }
            out
        };

        // Expressions standing in for JSON values, then inside JSON strings.
        for as_json in [true, false] {
            let text = render(as_json);
            if let Ok(parsed) = serde_json::from_str::<JsonValue>(&text) {
                if parsed.is_object() || parsed.is_array() {
                    return parsed;
                }
            }
        }
        JsonValue::String(render(false))
    }
}

/// A replacement target is a JSON pointer (`/a/0`, `#/a/0`) or a dotted path
/// (`a.b[0]`).
fn replacement_pointer(target: &str) -> Result<JsonPointer, ParameterError> {
    let invalid = |message: String| ParameterError::InvalidReplacementTarget {
        target: target.to_string(),
        message,
    };
    let t = target.trim();
    if t.is_empty() || t.starts_with('/') || t.starts_with('#') {
        return JsonPointer::parse(t).map_err(|e| invalid(e.to_string()));
    }
    let mut tokens = Vec::new();
    for part in t.split('.') {
        let (name, indexes) = match part.find('[') {
            Some(i) => (&part[..i], &part[i..]),
            None => (part, ""),
        };
        if !name.is_empty() {
            tokens.push(name.to_string());
        }
        for idx in indexes.split('[').filter(|s| !s.is_empty()) {
            let idx = idx
                .strip_suffix(']')
                .ok_or_else(|| invalid("unclosed '['".to_string()))?;
            tokens.push(idx.trim_matches(|c| c == '\'' || c == '"').to_string());
        }
    }
    Ok(JsonPointer::from_tokens(tokens))
}

/// Map raw inputs of a direct operation call onto the operation's declared
/// parameters and body.
pub fn prepare_operation_parameters(
    declared: &[OpenApiParam],
    path_template: &str,
    body_spec: Option<&RequestBodySpec>,
    inputs: &Map<String, JsonValue>,
) -> Result<(PreparedParameters, Option<PreparedBody>), ParameterError> {
    let mut params: Vec<OpenApiParam> = declared.to_vec();
    for name in path_placeholders(path_template) {
        if !params.iter().any(|p| p.location == OpenApiParamLocation::Path && p.name == name) {
            params.push(OpenApiParam {
                name,
                location: OpenApiParamLocation::Path,
                required: true,
            });
        }
    }

    let mut out = PreparedParameters::default();
    let mut used: BTreeSet<&str> = BTreeSet::new();
    let mut body: Option<JsonValue> = None;
    let mut form = Map::new();

    for p in &params {
        let Some(value) = inputs.get(&p.name) else {
            let location = match p.location {
                OpenApiParamLocation::Body | OpenApiParamLocation::FormData => None,
                other => Some(other),
            };
            if p.required && location.is_some() {
                return Err(ParameterError::MissingRequiredParameter {
                    name: p.name.clone(),
                    location: location_name(p.location).to_string(),
                });
            }
            continue;
        };
        used.insert(p.name.as_str());
        let value = value.clone();
        match p.location {
            OpenApiParamLocation::Path => {
                out.path.insert(p.name.clone(), value);
            }
            OpenApiParamLocation::Query => {
                out.query.insert(p.name.clone(), value);
            }
            OpenApiParamLocation::Header => {
                out.header.insert(p.name.clone(), value);
            }
            OpenApiParamLocation::Cookie => {
                out.cookie.insert(p.name.clone(), value);
            }
            OpenApiParamLocation::Body => body = Some(value),
            OpenApiParamLocation::FormData => {
                form.insert(p.name.clone(), value);
            }
        }
    }
    if body.is_none() && !form.is_empty() {
        body = Some(JsonValue::Object(form));
    }

    let unused: Map<String, JsonValue> = inputs
        .iter()
        .filter(|(k, _)| !used.contains(k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let Some(spec) = body_spec else {
        for name in unused.keys() {
            tracing::warn!(input = %name, "ignoring input that matches no operation parameter");
        }
        return Ok((out, None));
    };

    if body.is_none() {
        body = match unused.get("body") {
            Some(b) => {
                for name in unused.keys().filter(|k| *k != "body") {
                    tracing::warn!(input = %name, "ignoring input alongside explicit body");
                }
                Some(b.clone())
            }
            None if !unused.is_empty() => Some(JsonValue::Object(unused)),
            None => None,
        };
    }

    match body {
        Some(payload) => Ok((
            out,
            Some(PreparedBody {
                content_type: spec.preferred_content_type().map(str::to_string),
                payload,
            }),
        )),
        None if spec.required => Err(ParameterError::MissingRequiredBody),
        None => Ok((out, None)),
    }
}

fn location_name(loc: OpenApiParamLocation) -> &'static str {
    match loc {
        OpenApiParamLocation::Path => "path",
        OpenApiParamLocation::Query => "query",
        OpenApiParamLocation::Header => "header",
        OpenApiParamLocation::Cookie => "cookie",
        OpenApiParamLocation::Body => "body",
        OpenApiParamLocation::FormData => "formData",
    }
}

/// `{name}` tokens of a path template, in order.
pub(crate) fn path_placeholders(path: &str) -> Vec<String> {
    path.split('{')
        .skip(1)
        .filter_map(|rest| rest.split_once('}').map(|(name, _)| name.to_string()))
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ExecutionState;
    use crate::RuntimeParams;
    use serde_json::json;

    fn state() -> ExecutionState {
        let mut s = ExecutionState::new(
            "wf",
            ["a"],
            json!({"petId": 7, "name": "Rex", "tags": ["x", "y"]}),
            RuntimeParams::default(),
        );
        s.step_outputs.insert("a".into(), json!({"token": "abc"}).as_object().cloned().unwrap());
        s
    }

    fn body(payload: JsonValue) -> RequestBody {
        serde_json::from_value(json!({"payload": payload})).unwrap()
    }

    #[test]
    fn template_body_keeps_types() {
        let s = state();
        let p = ParameterProcessor::new(ExpressionEvaluator::new(&s), None);

        let out = p
            .prepare_request_body(&body(json!(r#"{"id": {$inputs.petId}, "tags": {$inputs.tags}}"#)))
            .unwrap()
            .unwrap();
        assert_eq!(out.payload, json!({"id": 7, "tags": ["x", "y"]}));

        let out = p
            .prepare_request_body(&body(json!(r#"{"name": "{$inputs.name}"}"#)))
            .unwrap()
            .unwrap();
        assert_eq!(out.payload, json!({"name": "Rex"}));

        let out = p.prepare_request_body(&body(json!("$inputs.tags"))).unwrap().unwrap();
        assert_eq!(out.payload, json!(["x", "y"]));
    }

    #[test]
    fn replacements_accept_pointer_and_dot_targets() {
        let s = state();
        let p = ParameterProcessor::new(ExpressionEvaluator::new(&s), None);
        let rb: RequestBody = serde_json::from_value(json!({
            "payload": {"pet": {"name": "old"}, "tags": []},
            "replacements": [
                {"target": "/pet/name", "value": "$inputs.name"},
                {"target": "pet.auth", "value": "$steps.a.outputs.token"},
                {"target": "tags[0]", "value": "first"}
            ]
        }))
        .unwrap();
        let out = p.prepare_request_body(&rb).unwrap().unwrap();
        assert_eq!(
            out.payload,
            json!({"pet": {"name": "Rex", "auth": "abc"}, "tags": ["first"]})
        );
    }

    #[test]
    fn operation_inputs_map_to_locations() {
        let declared = vec![OpenApiParam {
            name: "limit".into(),
            location: OpenApiParamLocation::Query,
            required: false,
        }];
        let spec = RequestBodySpec {
            required: true,
            content_types: vec!["application/json".into()],
        };
        let inputs = json!({"petId": 3, "limit": 10, "name": "Rex"});
        let (params, body) =
            prepare_operation_parameters(&declared, "/pets/{petId}", Some(&spec), inputs.as_object().unwrap())
                .unwrap();
        assert_eq!(params.path["petId"], json!(3));
        assert_eq!(params.query["limit"], json!(10));
        assert_eq!(body.unwrap().payload, json!({"name": "Rex"}));

        let err = prepare_operation_parameters(&declared, "/pets/{petId}", Some(&spec), &Map::new()).unwrap_err();
        assert_eq!(
            err,
            ParameterError::MissingRequiredParameter {
                name: "petId".into(),
                location: "path".into()
            }
        );
        let only_path = json!({"petId": 1});
        let err = prepare_operation_parameters(&declared, "/pets/{petId}", Some(&spec), only_path.as_object().unwrap())
            .unwrap_err();
        assert_eq!(err, ParameterError::MissingRequiredBody);
    }
}
