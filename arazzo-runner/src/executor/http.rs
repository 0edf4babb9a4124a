use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct HttpRequestParts {
    pub method: String,
    pub url: url::Url,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct HttpResponseParts {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpError {
    #[error("timeout")]
    Timeout,
    #[error("connect/dns/tls error: {0}")]
    Network(String),
    #[error("response too large (>{max_bytes} bytes)")]
    ResponseTooLarge { max_bytes: usize },
    #[error("http error: {0}")]
    Other(String),
}

/// Transport used for every outgoing call, operations and token requests alike.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(
        &self,
        req: HttpRequestParts,
        timeout: Duration,
        max_response_bytes: usize,
    ) -> Result<HttpResponseParts, HttpError>;
}

pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Redirects are not followed; a 3xx is handed back as the response.
    pub fn new(user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(user_agent.to_string())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to a default reqwest client");
                reqwest::Client::new()
            });
        Self { client }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new(concat!("arazzo-runner/", env!("CARGO_PKG_VERSION")))
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(
        &self,
        req: HttpRequestParts,
        timeout: Duration,
        max_response_bytes: usize,
    ) -> Result<HttpResponseParts, HttpError> {
        let method: reqwest::Method = req
            .method
            .parse()
            .map_err(|e: <reqwest::Method as std::str::FromStr>::Err| HttpError::Other(e.to_string()))?;
        let mut rb = self.client.request(method, req.url).timeout(timeout);

        for (k, v) in req.headers {
            rb = rb.header(k, v);
        }
        if !req.body.is_empty() {
            rb = rb.body(req.body);
        }

        let mut resp = rb.send().await.map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();
        let headers = collect_headers(resp.headers());

        let too_large = HttpError::ResponseTooLarge {
            max_bytes: max_response_bytes,
        };
        if resp.content_length().is_some_and(|len| len as usize > max_response_bytes) {
            return Err(too_large);
        }
        // Content-Length may be absent or wrong; enforce the cap while reading.
        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(map_reqwest_error)? {
            if body.len() + chunk.len() > max_response_bytes {
                return Err(too_large);
            }
            body.extend_from_slice(&chunk);
        }

        Ok(HttpResponseParts { status, headers, body })
    }
}

/// Repeated headers are joined with `, `; values that are not valid UTF-8 are dropped.
fn collect_headers(map: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (k, v) in map {
        let Ok(value) = v.to_str() else {
            continue;
        };
        headers
            .entry(k.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    headers
}

fn map_reqwest_error(e: reqwest::Error) -> HttpError {
    if e.is_timeout() {
        return HttpError::Timeout;
    }
    if e.is_connect() || e.is_request() {
        return HttpError::Network(e.to_string());
    }
    HttpError::Other(e.to_string())
}
