use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::auth::env_mapping::{api_title_prefix, credential_env_var, CredentialKind};
use crate::auth::model::{
    AuthLocation, AuthValue, HttpAuthScheme, OAuth2FlowType, RequestAuthValue, SecurityOption,
    SecurityScheme,
};
use crate::auth::oauth2::{fetch_client_credentials_token, AccessToken};
use crate::auth::parser::parse_security_schemes;
use crate::config::RunnerConfig;
use crate::env::EnvSource;
use crate::executor::HttpClient;
use crate::openapi::OpenApiSources;
use crate::secrets::SecretValue;

/// Turns an operation's security options into values to put on the request.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Credentials for the first security option that can be fully satisfied.
    /// An empty result means the request goes out unauthenticated.
    async fn resolve_credentials(
        &self,
        options: &[SecurityOption],
        source_name: Option<&str>,
    ) -> Vec<RequestAuthValue>;
}

struct SourceSchemes {
    prefix: String,
    schemes: BTreeMap<String, SecurityScheme>,
}

/// (source, scheme, space-joined sorted scopes)
type TokenKey = (String, String, String);

struct CachedToken {
    token: SecretValue,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn new(token: AccessToken) -> Self {
        Self {
            expires_at: token.expires_in.map(|secs| Instant::now() + Duration::from_secs(secs)),
            token: token.token,
        }
    }

    fn is_fresh(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// Reads credentials from the environment and fetches OAuth2 client
/// credentials tokens on demand. Fetched tokens are cached per source, scheme
/// and scope set until the server-reported `expires_in` runs out.
pub struct DefaultCredentialProvider {
    sources: BTreeMap<String, SourceSchemes>,
    env: Arc<dyn EnvSource>,
    http: Arc<dyn HttpClient>,
    timeout: Duration,
    max_response_bytes: usize,
    token_cache: Mutex<HashMap<TokenKey, CachedToken>>,
}

impl DefaultCredentialProvider {
    pub fn new(sources: &OpenApiSources, env: Arc<dyn EnvSource>, http: Arc<dyn HttpClient>) -> Self {
        let defaults = RunnerConfig::default();
        let sources = sources
            .iter()
            .map(|(name, doc)| {
                (
                    name.clone(),
                    SourceSchemes {
                        prefix: api_title_prefix(doc.title(), name),
                        schemes: parse_security_schemes(doc),
                    },
                )
            })
            .collect();
        Self {
            sources,
            env,
            http,
            timeout: defaults.http_timeout,
            max_response_bytes: defaults.max_response_bytes,
            token_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_limits(mut self, timeout: Duration, max_response_bytes: usize) -> Self {
        self.timeout = timeout;
        self.max_response_bytes = max_response_bytes;
        self
    }

    /// Locate a scheme, preferring the named source.
    fn find_scheme(&self, scheme_name: &str, source_name: Option<&str>) -> Option<(&str, &SourceSchemes, &SecurityScheme)> {
        if let Some(name) = source_name {
            if let Some((key, src)) = self.sources.get_key_value(name) {
                if let Some(scheme) = src.schemes.get(scheme_name) {
                    return Some((key.as_str(), src, scheme));
                }
            }
        }
        self.sources
            .iter()
            .find_map(|(key, src)| src.schemes.get(scheme_name).map(|s| (key.as_str(), src, s)))
    }

    fn env_value(&self, prefix: &str, scheme_name: &str, flow: Option<OAuth2FlowType>, kind: CredentialKind) -> Option<String> {
        self.env.var(&credential_env_var(prefix, scheme_name, flow, kind))
    }

    async fn resolve_auth_value(
        &self,
        source: &str,
        src: &SourceSchemes,
        scheme_name: &str,
        scheme: &SecurityScheme,
        scopes: &[String],
    ) -> Option<AuthValue> {
        let prefix = src.prefix.as_str();
        let secret = |kind| {
            self.env_value(prefix, scheme_name, None, kind)
                .map(SecretValue::from_string)
        };
        match scheme {
            SecurityScheme::ApiKey { .. } => secret(CredentialKind::ApiKey).map(AuthValue::ApiKey),
            SecurityScheme::Http { scheme: HttpAuthScheme::Basic, .. } => {
                let username = self.env_value(prefix, scheme_name, None, CredentialKind::Username)?;
                let password = secret(CredentialKind::Password)?;
                Some(AuthValue::Basic { username, password })
            }
            SecurityScheme::Http { .. } => secret(CredentialKind::Token).map(AuthValue::Bearer),
            SecurityScheme::OpenIdConnect { .. } => secret(CredentialKind::Token).map(AuthValue::OpenIdConnect),
            SecurityScheme::Custom { .. } => secret(CredentialKind::Token).map(AuthValue::Custom),
            SecurityScheme::OAuth2 { flows } => {
                let cache_key = token_key(source, scheme_name, scopes);
                {
                    let mut cache = self.token_cache.lock().await;
                    let cached = cache.get(&cache_key).map(|c| (c.is_fresh(), c.token.clone()));
                    match cached {
                        Some((true, token)) => return Some(AuthValue::OAuth2AccessToken(token)),
                        Some((false, _)) => {
                            tracing::debug!(scheme = scheme_name, "cached oauth2 token expired");
                            cache.remove(&cache_key);
                        }
                        None => {}
                    }
                }
                for (flow_type, flow) in &flows.flows {
                    if *flow_type == OAuth2FlowType::ClientCredentials {
                        if let Some(fetched) = self
                            .client_credentials_token(prefix, scheme_name, flow.token_url.as_deref(), scopes)
                            .await
                        {
                            let token = fetched.token.clone();
                            self.token_cache.lock().await.insert(cache_key, CachedToken::new(fetched));
                            return Some(AuthValue::OAuth2AccessToken(token));
                        }
                    }
                    if let Some(token) = self.env_value(prefix, scheme_name, Some(*flow_type), CredentialKind::AccessToken) {
                        return Some(AuthValue::OAuth2AccessToken(SecretValue::from_string(token)));
                    }
                }
                None
            }
        }
    }

    async fn client_credentials_token(
        &self,
        prefix: &str,
        scheme_name: &str,
        token_url: Option<&str>,
        scopes: &[String],
    ) -> Option<AccessToken> {
        let flow = Some(OAuth2FlowType::ClientCredentials);
        let token_url = token_url?;
        let client_id = self.env_value(prefix, scheme_name, flow, CredentialKind::ClientId)?;
        let client_secret = self.env_value(prefix, scheme_name, flow, CredentialKind::ClientSecret)?;
        match fetch_client_credentials_token(
            self.http.as_ref(),
            token_url,
            &client_id,
            &SecretValue::from_string(client_secret),
            scopes,
            self.timeout,
            self.max_response_bytes,
        )
        .await
        {
            Ok(token) => {
                tracing::debug!(scheme = scheme_name, expires_in = ?token.expires_in, "fetched oauth2 client credentials token");
                Some(token)
            }
            Err(e) => {
                tracing::warn!(scheme = scheme_name, error = %e, "oauth2 token request failed");
                None
            }
        }
    }
}

#[async_trait]
impl CredentialProvider for DefaultCredentialProvider {
    async fn resolve_credentials(
        &self,
        options: &[SecurityOption],
        source_name: Option<&str>,
    ) -> Vec<RequestAuthValue> {
        let mut allows_anonymous = false;
        let mut best_partial: Vec<RequestAuthValue> = Vec::new();

        for option in options {
            if option.is_anonymous() {
                allows_anonymous = true;
                continue;
            }
            let mut resolved = Vec::new();
            for req in &option.requirements {
                let Some((source, src, scheme)) = self.find_scheme(&req.scheme_name, source_name) else {
                    tracing::debug!(scheme = %req.scheme_name, "security scheme not declared by any source");
                    continue;
                };
                let Some(value) = self
                    .resolve_auth_value(source, src, &req.scheme_name, scheme, &req.scopes)
                    .await
                else {
                    tracing::debug!(scheme = %req.scheme_name, source, "no credential available");
                    continue;
                };
                if let Some(rav) = to_request_auth(scheme, value) {
                    resolved.push(rav);
                }
            }
            if resolved.len() == option.requirements.len() {
                return resolved;
            }
            if resolved.len() > best_partial.len() {
                best_partial = resolved;
            }
        }

        if allows_anonymous {
            return Vec::new();
        }
        if !best_partial.is_empty() {
            tracing::warn!("no security option fully satisfied; sending partial credentials");
        }
        best_partial
    }
}

fn token_key(source: &str, scheme_name: &str, scopes: &[String]) -> TokenKey {
    let mut scopes: Vec<&str> = scopes.iter().map(String::as_str).collect();
    scopes.sort_unstable();
    scopes.dedup();
    (source.to_string(), scheme_name.to_string(), scopes.join(" "))
}

fn bearer(token: &SecretValue) -> SecretValue {
    let mut bytes = b"Bearer ".to_vec();
    bytes.extend_from_slice(token.expose_bytes());
    SecretValue::from_bytes(bytes)
}

fn to_request_auth(scheme: &SecurityScheme, value: AuthValue) -> Option<RequestAuthValue> {
    let authorization = |value| RequestAuthValue {
        location: AuthLocation::Header,
        name: "Authorization".to_string(),
        value,
    };
    let rav = match (scheme, value) {
        (SecurityScheme::ApiKey { name, location }, AuthValue::ApiKey(v)) => RequestAuthValue {
            location: *location,
            name: name.clone(),
            value: v,
        },
        (_, AuthValue::Basic { username, password }) => {
            let mut raw = format!("{username}:").into_bytes();
            raw.extend_from_slice(password.expose_bytes());
            let encoded = base64::engine::general_purpose::STANDARD.encode(&raw);
            authorization(SecretValue::from_string(format!("Basic {encoded}")))
        }
        (_, AuthValue::Bearer(t) | AuthValue::OAuth2AccessToken(t) | AuthValue::OpenIdConnect(t)) => {
            authorization(bearer(&t))
        }
        (SecurityScheme::Custom { header, .. }, AuthValue::Custom(v)) => RequestAuthValue {
            location: AuthLocation::Header,
            name: header.clone(),
            value: v,
        },
        _ => return None,
    };
    Some(rav)
}
