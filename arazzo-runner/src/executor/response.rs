use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use serde_json::{Map, Value as JsonValue};

use crate::executor::http::HttpResponseParts;
use crate::retry::{get_header_ci, parse_retry_after};

/// A normalized HTTP response: `{status_code, headers, body}`.
///
/// The body is parsed as JSON when possible, otherwise kept as text. An empty
/// body is `null`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OperationResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: JsonValue,
}

impl OperationResponse {
    pub fn from_parts(parts: HttpResponseParts) -> Self {
        Self {
            status_code: parts.status,
            headers: parts.headers,
            body: decode_body(&parts.body),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        get_header_ci(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn retry_after(&self) -> Option<Duration> {
        parse_retry_after(&self.headers, SystemTime::now())
    }

    /// Extra evaluation context for expressions that look at this response.
    pub fn eval_context(&self, url: &str, method: &str) -> Map<String, JsonValue> {
        let headers: Map<String, JsonValue> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
            .collect();
        let mut response = Map::new();
        response.insert("statusCode".into(), self.status_code.into());
        response.insert("headers".into(), JsonValue::Object(headers.clone()));
        response.insert("body".into(), self.body.clone());

        let mut ctx = Map::new();
        ctx.insert("statusCode".into(), self.status_code.into());
        ctx.insert("response".into(), JsonValue::Object(response));
        ctx.insert("headers".into(), JsonValue::Object(headers));
        ctx.insert("body".into(), self.body.clone());
        ctx.insert("url".into(), JsonValue::String(url.to_string()));
        ctx.insert("method".into(), JsonValue::String(method.to_string()));
        ctx
    }
}

fn decode_body(bytes: &[u8]) -> JsonValue {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return JsonValue::Null;
    }
    match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(_) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}
