use std::collections::BTreeMap;

use arazzo_core::expressions::{parse_runtime_expr, ExprRoot, JsonPointer, PathSegment};
use serde_json::{Map, Value as JsonValue};

use crate::executor::response::OperationResponse;
use crate::expression::ExpressionEvaluator;

/// Extract named step outputs from a response. `evaluator` must carry the
/// response's evaluation context.
pub fn extract_outputs(
    outputs: &BTreeMap<String, String>,
    response: &OperationResponse,
    evaluator: &ExpressionEvaluator<'_>,
) -> Map<String, JsonValue> {
    let mut likely: Option<Map<String, JsonValue>> = None;
    let mut out = Map::new();
    for (name, expr) in outputs {
        let mut value = extract_one(expr, response, evaluator);
        if value.is_null() {
            let ids = likely.get_or_insert_with(|| likely_ids(&response.body));
            if let Some(v) = ids.get(name) {
                tracing::debug!(output = %name, "output filled from inferred identifier");
                value = v.clone();
            }
        }
        out.insert(name.clone(), value);
    }
    out
}

fn extract_one(expr: &str, response: &OperationResponse, evaluator: &ExpressionEvaluator<'_>) -> JsonValue {
    if let Some(pointer) = body_pointer(expr) {
        return pointer.resolve(&response.body).cloned().unwrap_or(JsonValue::Null);
    }
    evaluator.evaluate_template(expr)
}

/// `$response.body#/a/0` and `$response.body.a[0]` both name a location in
/// the body.
fn body_pointer(expr: &str) -> Option<JsonPointer> {
    let parsed = parse_runtime_expr(expr.trim()).ok()?;
    if parsed.root != ExprRoot::Response || parsed.field_at(0) != Some("body") {
        return None;
    }
    let mut tokens: Vec<String> = parsed.segments[1..]
        .iter()
        .map(|seg| match seg {
            PathSegment::Field(f) => f.clone(),
            PathSegment::Index(i) => i.to_string(),
        })
        .collect();
    if let Some(ptr) = &parsed.pointer {
        tokens.extend(ptr.tokens());
    }
    Some(JsonPointer::from_tokens(tokens))
}

/// Identifier-looking values of the body: `fooId`/`foo_id` fields, the `id`
/// field, and for string fields holding a URL that ends in
/// `/<collection>/<value>` both `<singular collection>Id` and `id`. Explicit
/// fields win over values read from URLs.
fn likely_ids(body: &JsonValue) -> Map<String, JsonValue> {
    let mut ids = Map::new();
    let Some(obj) = body.as_object() else {
        return ids;
    };

    for v in obj.values() {
        if let Some((collection, value)) = v.as_str().and_then(url_tail) {
            let singular = collection.strip_suffix('s').unwrap_or(collection);
            let value = JsonValue::String(value.to_string());
            ids.entry(format!("{singular}Id")).or_insert_with(|| value.clone());
            ids.entry("id").or_insert(value);
        }
    }

    for (k, v) in obj {
        if v.is_null() {
            continue;
        }
        let id_like = k == "id"
            || (k.len() > 2 && k.ends_with("Id"))
            || (k.len() > 3 && k.ends_with("_id"));
        if id_like {
            ids.insert(k.clone(), v.clone());
        }
    }
    ids
}

/// `(collection, value)` from the last two path segments of an absolute or
/// root-relative URL.
fn url_tail(s: &str) -> Option<(&str, &str)> {
    let path = if let Some(rest) = s.strip_prefix("https://").or_else(|| s.strip_prefix("http://")) {
        &rest[rest.find('/')?..]
    } else if s.starts_with('/') {
        s
    } else {
        return None;
    };
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let mut segments = path.split('/').filter(|seg| !seg.is_empty()).rev();
    let value = segments.next()?;
    let collection = segments.next()?;
    let is_collection = collection.chars().all(|c| c.is_ascii_alphabetic() || c == '-' || c == '_');
    (is_collection && !value.contains('{')).then_some((collection, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ExecutionState;
    use crate::RuntimeParams;
    use serde_json::json;

    fn run(outputs: &[(&str, &str)], body: JsonValue, url: &str) -> Map<String, JsonValue> {
        let response = OperationResponse {
            status_code: 200,
            headers: BTreeMap::from([("X-Request-Id".to_string(), "r-1".to_string())]),
            body,
        };
        let state = ExecutionState::new("wf", ["s"], json!({}), RuntimeParams::default());
        let extra = response.eval_context(url, "GET");
        let evaluator = ExpressionEvaluator::new(&state).with_extra(&extra);
        let outputs = outputs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        extract_outputs(&outputs, &response, &evaluator)
    }

    #[test]
    fn pointer_and_dot_forms_agree() {
        let body = json!({"data": {"items": [{"name": "a"}, {"name": "b"}]}});
        let out = run(
            &[
                ("ptr", "$response.body#/data/items/1/name"),
                ("dot", "$response.body.data.items[1].name"),
                ("status", "$statusCode"),
                ("reqId", "$response.header.x-request-id"),
            ],
            body,
            "https://api.example.com/items",
        );
        assert_eq!(out["ptr"], json!("b"));
        assert_eq!(out["ptr"], out["dot"]);
        assert_eq!(out["status"], json!(200));
        assert_eq!(out["reqId"], json!("r-1"));
    }

    #[test]
    fn inferred_ids_fill_only_matching_null_outputs() {
        let out = run(
            &[
                ("petId", "$response.body#/missing"),
                ("other", "$response.body#/missing"),
                ("ownerId", "$response.body#/nope"),
            ],
            json!({"ownerId": 9, "href": "https://api.example.com/pets/42"}),
            "https://api.example.com/pets",
        );
        assert_eq!(out["petId"], json!("42"));
        assert_eq!(out["other"], JsonValue::Null);
        assert_eq!(out["ownerId"], json!(9));
    }

    #[test]
    fn request_url_is_not_a_source_of_ids() {
        let out = run(
            &[("id", "$response.body#/id"), ("v1Id", "$response.body#/v1Id")],
            json!({"name": "x"}),
            "https://api.example.com/v1/users",
        );
        assert_eq!(out["id"], JsonValue::Null);
        assert_eq!(out["v1Id"], JsonValue::Null);
    }

    #[test]
    fn body_id_field_wins_over_url_fields() {
        let out = run(
            &[("id", "$response.body#/missing")],
            json!({"self": "/orders/7?expand=lines", "id": 99}),
            "https://api.example.com/orders",
        );
        assert_eq!(out["id"], json!(99));
        assert_eq!(url_tail("/orders/7?expand=lines"), Some(("orders", "7")));
        assert_eq!(url_tail("not a url"), None);
        assert_eq!(url_tail("https://api.example.com"), None);
    }
}
