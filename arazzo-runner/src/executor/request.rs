use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::auth::{AuthLocation, CredentialProvider, RequestAuthValue, SecurityOption};
use crate::executor::http::{HttpClient, HttpError, HttpRequestParts};
use crate::executor::params::{PreparedBody, PreparedParameters};
use crate::executor::response::OperationResponse;
use crate::expression::stringify;
use crate::secrets::{redact_headers, RedactionPolicy};

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("invalid request url '{url}': {message}")]
    InvalidUrl { url: String, message: String },
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("cannot encode request body: {0}")]
    Body(String),
}

/// A sent request and its normalized response.
#[derive(Debug, Clone)]
pub struct ExecutedRequest {
    pub method: String,
    pub url: String,
    pub response: OperationResponse,
}

/// Builds and sends operation requests, attaching resolved credentials.
pub struct HttpExecutor {
    client: Arc<dyn HttpClient>,
    credentials: Arc<dyn CredentialProvider>,
    timeout: Duration,
    max_response_bytes: usize,
}

impl HttpExecutor {
    pub fn new(
        client: Arc<dyn HttpClient>,
        credentials: Arc<dyn CredentialProvider>,
        timeout: Duration,
        max_response_bytes: usize,
    ) -> Self {
        Self {
            client,
            credentials,
            timeout,
            max_response_bytes,
        }
    }

    pub async fn execute_request(
        &self,
        method: &str,
        url: &str,
        params: &PreparedParameters,
        body: Option<&PreparedBody>,
        security: &[SecurityOption],
        source_name: Option<&str>,
    ) -> Result<ExecutedRequest, RequestError> {
        let auth = if security.is_empty() {
            Vec::new()
        } else {
            self.credentials.resolve_credentials(security, source_name).await
        };
        let req = build_request(method, url, params, body, &auth)?;

        let credential_headers: Vec<String> = auth
            .iter()
            .filter(|a| a.location == AuthLocation::Header)
            .map(|a| a.name.clone())
            .collect();
        let logged = redact_headers(&req.headers, &RedactionPolicy::default(), &credential_headers);
        tracing::debug!(method = %req.method, url = %redact_query(&req.url, &auth), headers = ?logged.headers, "sending request");

        let method = req.method.clone();
        let sent_url = req.url.to_string();
        let parts = self.client.send(req, self.timeout, self.max_response_bytes).await?;
        let response = OperationResponse::from_parts(parts);
        tracing::debug!(status = response.status_code, "received response");
        Ok(ExecutedRequest {
            method,
            url: sent_url,
            response,
        })
    }
}

/// Assemble the request. Explicit parameters win over credentials with the
/// same name.
pub fn build_request(
    method: &str,
    url: &str,
    params: &PreparedParameters,
    body: Option<&PreparedBody>,
    auth: &[RequestAuthValue],
) -> Result<HttpRequestParts, RequestError> {
    let mut url_text = url.to_string();
    for (name, value) in &params.path {
        let encoded = urlencoding::encode(&stringify(value)).into_owned();
        url_text = url_text.replace(&format!("{{{name}}}"), &encoded);
    }
    if url_text.contains('{') {
        tracing::warn!(url = %url_text, "request url still has unresolved placeholders");
    }
    let mut parsed = url::Url::parse(&url_text).map_err(|e| RequestError::InvalidUrl {
        url: url_text.clone(),
        message: e.to_string(),
    })?;

    let mut query: Vec<(String, String)> = Vec::new();
    for (name, value) in &params.query {
        match value {
            JsonValue::Null => {}
            JsonValue::Array(items) => query.extend(items.iter().map(|v| (name.clone(), stringify(v)))),
            v => query.push((name.clone(), stringify(v))),
        }
    }

    let mut headers: BTreeMap<String, String> = params
        .header
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), stringify(v)))
        .collect();
    let mut cookies: Vec<(String, String)> = params
        .cookie
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), stringify(v)))
        .collect();

    for a in auth {
        let Some(value) = a.value.expose_str() else {
            tracing::warn!(name = %a.name, "skipping non UTF-8 credential");
            continue;
        };
        match a.location {
            AuthLocation::Header => {
                if !headers.keys().any(|k| k.eq_ignore_ascii_case(&a.name)) {
                    headers.insert(a.name.clone(), value.to_string());
                }
            }
            AuthLocation::Query => {
                if !query.iter().any(|(k, _)| *k == a.name) {
                    query.push((a.name.clone(), value.to_string()));
                }
            }
            AuthLocation::Cookie => {
                if !cookies.iter().any(|(k, _)| *k == a.name) {
                    cookies.push((a.name.clone(), value.to_string()));
                }
            }
        }
    }

    if !query.is_empty() {
        let mut pairs = parsed.query_pairs_mut();
        for (k, v) in &query {
            pairs.append_pair(k, v);
        }
    }
    if !cookies.is_empty() {
        merge_cookies(&mut headers, &cookies);
    }

    let body_bytes = match body {
        Some(b) => {
            let content_type = b.content_type.as_deref().unwrap_or("application/json");
            if !headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
                headers.insert("Content-Type".to_string(), content_type.to_string());
            }
            encode_body(content_type, &b.payload)?
        }
        None => Vec::new(),
    };

    Ok(HttpRequestParts {
        method: method.to_ascii_uppercase(),
        url: parsed,
        headers,
        body: body_bytes,
    })
}

/// Append cookie parameters to any explicit `Cookie` header. Names already
/// set by that header win; values are percent-encoded.
fn merge_cookies(headers: &mut BTreeMap<String, String>, cookies: &[(String, String)]) {
    let explicit_key = headers.keys().find(|k| k.eq_ignore_ascii_case("cookie")).cloned();
    let explicit = explicit_key.and_then(|k| headers.remove(&k)).filter(|v| !v.trim().is_empty());
    let taken: Vec<&str> = explicit
        .as_deref()
        .map(|h| h.split(';').filter_map(|pair| pair.split('=').next()).map(str::trim).collect())
        .unwrap_or_default();

    let mut parts: Vec<String> = explicit.iter().map(|h| h.trim().trim_end_matches(';').to_string()).collect();
    parts.extend(
        cookies
            .iter()
            .filter(|(k, _)| !taken.contains(&k.as_str()))
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v))),
    );
    headers.insert("Cookie".to_string(), parts.join("; "));
}

fn encode_body(content_type: &str, payload: &JsonValue) -> Result<Vec<u8>, RequestError> {
    let ct = content_type.to_ascii_lowercase();
    if ct.contains("json") {
        return serde_json::to_vec(payload).map_err(|e| RequestError::Body(e.to_string()));
    }
    if ct.contains("x-www-form-urlencoded") {
        let JsonValue::Object(fields) = payload else {
            return Err(RequestError::Body("form bodies must be objects".to_string()));
        };
        let mut form = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in fields {
            match v {
                JsonValue::Null => {}
                JsonValue::Array(items) => {
                    for item in items {
                        form.append_pair(k, &stringify(item));
                    }
                }
                v => {
                    form.append_pair(k, &stringify(v));
                }
            }
        }
        return Ok(form.finish().into_bytes());
    }
    Ok(match payload {
        JsonValue::String(s) => s.clone().into_bytes(),
        JsonValue::Null => Vec::new(),
        other => other.to_string().into_bytes(),
    })
}

/// The URL with query credentials masked, for logs.
fn redact_query(url: &url::Url, auth: &[RequestAuthValue]) -> String {
    let secret_names: Vec<&str> = auth
        .iter()
        .filter(|a| a.location == AuthLocation::Query)
        .map(|a| a.name.as_str())
        .collect();
    if secret_names.is_empty() {
        return url.to_string();
    }
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if secret_names.contains(&&*k) { "<redacted>".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}
