use std::borrow::Cow;

use arazzo_core::expressions::{
    is_runtime_expr, parse_runtime_expr, parse_template, ExprRoot, PathSegment, RuntimeExpr, Segment,
};
use serde_json::{Map, Value as JsonValue};

use super::condition::{evaluate_condition, ConditionError};
use crate::state::ExecutionState;

/// Evaluates runtime expressions against one [`ExecutionState`].
///
/// Besides the state itself the evaluator can see the Arazzo source
/// descriptions, the document's components, and caller-supplied extra context
/// (`statusCode`, `response`, `headers`, `body`, `url`, `method`). Unresolvable
/// paths evaluate to `null`; evaluation never fails.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionEvaluator<'a> {
    state: &'a ExecutionState,
    source_descriptions: Option<&'a JsonValue>,
    components: Option<&'a JsonValue>,
    extra: Option<&'a Map<String, JsonValue>>,
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new(state: &'a ExecutionState) -> Self {
        Self {
            state,
            source_descriptions: None,
            components: None,
            extra: None,
        }
    }

    pub fn with_source_descriptions(mut self, source_descriptions: &'a JsonValue) -> Self {
        self.source_descriptions = Some(source_descriptions);
        self
    }

    pub fn with_components(mut self, components: &'a JsonValue) -> Self {
        self.components = Some(components);
        self
    }

    pub fn with_extra(mut self, extra: &'a Map<String, JsonValue>) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn state(&self) -> &'a ExecutionState {
        self.state
    }

    /// Evaluate one expression. Strings that do not start with `$` are
    /// returned verbatim.
    pub fn evaluate(&self, expr: &str) -> JsonValue {
        let trimmed = expr.trim();
        if !trimmed.starts_with('$') {
            return JsonValue::String(expr.to_string());
        }
        match parse_runtime_expr(trimmed) {
            Ok(parsed) => self.evaluate_parsed(&parsed),
            Err(e) => {
                tracing::debug!(expression = trimmed, error = %e, "unparseable runtime expression");
                JsonValue::Null
            }
        }
    }

    pub fn evaluate_parsed(&self, expr: &RuntimeExpr) -> JsonValue {
        let Some(value) = self.resolve(expr) else {
            return JsonValue::Null;
        };
        match &expr.pointer {
            Some(ptr) => ptr.resolve(value.as_ref()).cloned().unwrap_or(JsonValue::Null),
            None => value.into_owned(),
        }
    }

    /// Evaluate a string that may be a whole expression, a `{$expr}` template,
    /// or a plain literal. A template made of a single `{$expr}` keeps the
    /// expression's type; mixed templates render to a string.
    pub fn evaluate_template(&self, s: &str) -> JsonValue {
        if is_runtime_expr(s) {
            return self.evaluate(s);
        }
        let template = match parse_template(s) {
            Ok(t) if t.has_expressions() => t,
            _ => return JsonValue::String(s.to_string()),
        };
        if let Some(expr) = template.single_expr() {
            return self.evaluate(expr);
        }
        let mut out = String::new();
        for seg in &template.segments {
            match seg {
                Segment::Literal(l) => out.push_str(l),
                Segment::Expr(e) => out.push_str(&stringify(&self.evaluate(e))),
            }
        }
        JsonValue::String(out)
    }

    /// Recursively rewrite every string in `value`, depth-first.
    pub fn process_value(&self, value: &JsonValue) -> JsonValue {
        match value {
            JsonValue::String(s) => self.evaluate_template(s),
            JsonValue::Array(items) => JsonValue::Array(self.process_array_expressions(items)),
            JsonValue::Object(map) => JsonValue::Object(self.process_object_expressions(map)),
            other => other.clone(),
        }
    }

    pub fn process_object_expressions(&self, map: &Map<String, JsonValue>) -> Map<String, JsonValue> {
        map.iter().map(|(k, v)| (k.clone(), self.process_value(v))).collect()
    }

    pub fn process_array_expressions(&self, items: &[JsonValue]) -> Vec<JsonValue> {
        items.iter().map(|v| self.process_value(v)).collect()
    }

    pub fn evaluate_condition(&self, condition: &str) -> Result<bool, ConditionError> {
        evaluate_condition(condition, &|e| self.evaluate(e))
    }

    fn resolve(&self, expr: &RuntimeExpr) -> Option<Cow<'a, JsonValue>> {
        let segs = expr.segments.as_slice();
        match &expr.root {
            ExprRoot::Inputs => navigate(&self.state.inputs, segs).map(Cow::Borrowed),
            ExprRoot::Outputs => from_map(&self.state.workflow_outputs, segs),
            ExprRoot::Steps => {
                let (step_id, rest) = split_field(segs)?;
                let outputs = self.state.step_outputs.get(step_id)?;
                if rest.is_empty() {
                    let mut wrapped = Map::new();
                    wrapped.insert("outputs".to_string(), JsonValue::Object(outputs.clone()));
                    return Some(Cow::Owned(JsonValue::Object(wrapped)));
                }
                from_map(outputs, skip_outputs_segment(outputs, rest))
            }
            ExprRoot::Dependencies => {
                let (workflow_id, rest) = split_field(segs)?;
                let outputs = self.state.dependency_outputs.get(workflow_id)?;
                from_map(outputs, skip_outputs_segment(outputs, rest))
            }
            ExprRoot::Workflows => {
                let (workflow_id, rest) = split_field(segs)?;
                let outputs = match self.state.dependency_outputs.get(workflow_id) {
                    Some(o) => o,
                    None if workflow_id == self.state.workflow_id => &self.state.workflow_outputs,
                    None => return None,
                };
                from_map(outputs, skip_outputs_segment(outputs, rest))
            }
            ExprRoot::SourceDescriptions => navigate(self.source_descriptions?, segs).map(Cow::Borrowed),
            ExprRoot::Components => navigate(self.components?, segs).map(Cow::Borrowed),
            ExprRoot::Response => {
                let response = self.extra?.get("response")?;
                match segs {
                    [PathSegment::Field(h), PathSegment::Field(name), rest @ ..]
                        if h == "header" || h == "headers" =>
                    {
                        let value = header_ci(response.get("headers")?, name)?;
                        navigate(value, rest).map(|v| Cow::Owned(v.clone()))
                    }
                    _ => navigate(response, segs).map(Cow::Borrowed),
                }
            }
            ExprRoot::Context(name) if name == "headers" => {
                let headers = self.extra?.get("headers")?;
                match segs {
                    [PathSegment::Field(h), rest @ ..] => navigate(header_ci(headers, h)?, rest).map(Cow::Borrowed),
                    _ => navigate(headers, segs).map(Cow::Borrowed),
                }
            }
            root => navigate(self.extra?.get(root.name())?, segs).map(Cow::Borrowed),
        }
    }
}

/// Render a value for string interpolation. `null` renders as the empty string.
pub fn stringify(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn navigate<'v>(value: &'v JsonValue, segs: &[PathSegment]) -> Option<&'v JsonValue> {
    let mut cur = value;
    for seg in segs {
        cur = match (seg, cur) {
            (PathSegment::Field(f), JsonValue::Object(m)) => m.get(f)?,
            (PathSegment::Field(f), JsonValue::Array(a)) => a.get(f.parse::<usize>().ok()?)?,
            (PathSegment::Index(i), JsonValue::Array(a)) => a.get(*i)?,
            (PathSegment::Index(i), JsonValue::Object(m)) => m.get(&i.to_string())?,
            _ => return None,
        };
    }
    Some(cur)
}

fn from_map<'v>(map: &'v Map<String, JsonValue>, segs: &[PathSegment]) -> Option<Cow<'v, JsonValue>> {
    match segs.split_first() {
        None => Some(Cow::Owned(JsonValue::Object(map.clone()))),
        Some((PathSegment::Field(name), rest)) => navigate(map.get(name)?, rest).map(Cow::Borrowed),
        Some((PathSegment::Index(i), rest)) => navigate(map.get(&i.to_string())?, rest).map(Cow::Borrowed),
    }
}

fn split_field(segs: &[PathSegment]) -> Option<(&str, &[PathSegment])> {
    match segs.split_first()? {
        (PathSegment::Field(f), rest) => Some((f.as_str(), rest)),
        _ => None,
    }
}

/// `$steps.x.outputs.y` and `$steps.x.y` address the same value unless an
/// output is literally named `outputs`.
fn skip_outputs_segment<'s>(outputs: &Map<String, JsonValue>, segs: &'s [PathSegment]) -> &'s [PathSegment] {
    match segs.split_first() {
        Some((PathSegment::Field(f), rest)) if f == "outputs" && !outputs.contains_key("outputs") => rest,
        _ => segs,
    }
}

fn header_ci<'v>(headers: &'v JsonValue, name: &str) -> Option<&'v JsonValue> {
    headers
        .as_object()?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}
