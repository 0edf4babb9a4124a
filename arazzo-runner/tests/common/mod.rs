#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arazzo_core::{parse_document_str, ArazzoDocument, DocumentFormat};
use arazzo_runner::executor::{HttpClient, HttpError, HttpRequestParts, HttpResponseParts};
use arazzo_runner::openapi::{OpenApiDoc, OpenApiSources};
use arazzo_runner::{MapEnv, Runner, RunnerConfig};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

struct Route {
    method: String,
    path: String,
    responses: VecDeque<HttpResponseParts>,
}

/// Answers requests by method and URL path and records every request.
/// Queued responses are served in order; the last one repeats.
#[derive(Default)]
pub struct MockHttp {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequestParts>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, method: &str, path: &str, status: u16, body: JsonValue) -> Self {
        self.on_with_headers(method, path, status, &[], body)
    }

    pub fn on_with_headers(
        self,
        method: &str,
        path: &str,
        status: u16,
        headers: &[(&str, &str)],
        body: JsonValue,
    ) -> Self {
        let response = HttpResponseParts {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .chain([("Content-Type".to_string(), "application/json".to_string())])
                .collect(),
            body: serde_json::to_vec(&body).unwrap(),
        };
        {
            let mut routes = self.routes.lock().unwrap();
            match routes.iter_mut().find(|r| r.method == method && r.path == path) {
                Some(route) => route.responses.push_back(response),
                None => routes.push(Route {
                    method: method.to_string(),
                    path: path.to_string(),
                    responses: VecDeque::from([response]),
                }),
            }
        }
        self
    }

    pub fn requests(&self) -> Vec<HttpRequestParts> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<HttpRequestParts> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.path() == path)
            .collect()
    }
}

#[async_trait]
impl HttpClient for MockHttp {
    async fn send(
        &self,
        req: HttpRequestParts,
        _timeout: Duration,
        _max_response_bytes: usize,
    ) -> Result<HttpResponseParts, HttpError> {
        let key = (req.method.clone(), req.url.path().to_string());
        self.requests.lock().unwrap().push(req);
        let mut routes = self.routes.lock().unwrap();
        let Some(route) = routes.iter_mut().find(|r| r.method == key.0 && r.path == key.1) else {
            return Ok(HttpResponseParts {
                status: 404,
                headers: BTreeMap::new(),
                body: br#"{"error":"no route"}"#.to_vec(),
            });
        };
        let response = if route.responses.len() > 1 {
            route.responses.pop_front().unwrap()
        } else {
            route.responses.front().cloned().unwrap()
        };
        Ok(response)
    }
}

pub fn header<'a>(req: &'a HttpRequestParts, name: &str) -> Option<&'a str> {
    req.headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub fn body_json(req: &HttpRequestParts) -> JsonValue {
    serde_json::from_slice(&req.body).unwrap()
}

pub fn arazzo(yaml: &str) -> ArazzoDocument {
    parse_document_str(yaml, DocumentFormat::Yaml).unwrap().document
}

pub fn sources(docs: &[(&str, JsonValue)]) -> OpenApiSources {
    docs.iter()
        .map(|(name, raw)| (name.to_string(), OpenApiDoc::new(format!("{name}.json"), raw.clone())))
        .collect()
}

/// A runner over `document` that never sleeps between retries.
pub fn runner(document: ArazzoDocument, sources: OpenApiSources, http: Arc<MockHttp>, env: MapEnv) -> Runner {
    Runner::builder(document, sources)
        .http_client(http)
        .env(Arc::new(env))
        .config(RunnerConfig {
            honor_retry_after: false,
            ..RunnerConfig::default()
        })
        .build()
}
