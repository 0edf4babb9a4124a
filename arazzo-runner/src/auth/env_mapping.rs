use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};

use crate::auth::model::{HttpAuthScheme, OAuth2FlowType, SecurityScheme};
use crate::auth::parser::parse_security_schemes;
use crate::openapi::{server_env_vars, OpenApiSources};

/// Upper-case a name and squeeze everything outside `[A-Z0-9]` into single
/// underscores.
pub fn sanitize_env_name(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_uppercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// Prefix for the variables of one API: the first word of its title, or the
/// source name when the title is missing or yields nothing.
pub fn api_title_prefix(title: Option<&str>, fallback: &str) -> String {
    let from_title = title
        .and_then(|t| t.split_whitespace().next())
        .map(sanitize_env_name)
        .filter(|p| !p.is_empty());
    from_title.unwrap_or_else(|| {
        let p = sanitize_env_name(fallback);
        if p.is_empty() { "API".to_string() } else { p }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CredentialKind {
    ApiKey,
    Token,
    Username,
    Password,
    ClientId,
    ClientSecret,
    AccessToken,
}

impl CredentialKind {
    pub fn env_suffix(self) -> &'static str {
        match self {
            Self::ApiKey => "API_KEY",
            Self::Token => "TOKEN",
            Self::Username => "USERNAME",
            Self::Password => "PASSWORD",
            Self::ClientId => "CLIENT_ID",
            Self::ClientSecret => "CLIENT_SECRET",
            Self::AccessToken => "ACCESS_TOKEN",
        }
    }

    /// Key used in the mapping document.
    pub fn key(self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::Token => "token",
            Self::Username => "username",
            Self::Password => "password",
            Self::ClientId => "client_id",
            Self::ClientSecret => "client_secret",
            Self::AccessToken => "access_token",
        }
    }
}

/// `<PREFIX>_<SCHEME>[_FLOW]_<KIND>`
pub fn credential_env_var(
    prefix: &str,
    scheme_name: &str,
    flow: Option<OAuth2FlowType>,
    kind: CredentialKind,
) -> String {
    let mut name = format!("{prefix}_{}", sanitize_env_name(scheme_name));
    if let Some(flow) = flow {
        name.push('_');
        name.push_str(flow.env_suffix());
    }
    name.push('_');
    name.push_str(kind.env_suffix());
    name
}

/// The credentials a scheme reads from the environment, grouped by OAuth2 flow
/// (`None` for non-OAuth2 schemes).
pub fn credential_kinds(scheme: &SecurityScheme) -> Vec<(Option<OAuth2FlowType>, Vec<CredentialKind>)> {
    use CredentialKind::*;
    match scheme {
        SecurityScheme::ApiKey { .. } => vec![(None, vec![ApiKey])],
        SecurityScheme::Http { scheme: HttpAuthScheme::Basic, .. } => vec![(None, vec![Username, Password])],
        SecurityScheme::Http { .. } | SecurityScheme::OpenIdConnect { .. } | SecurityScheme::Custom { .. } => {
            vec![(None, vec![Token])]
        }
        SecurityScheme::OAuth2 { flows } => flows
            .flows
            .keys()
            .map(|flow| {
                let kinds = match flow {
                    OAuth2FlowType::Implicit => vec![ClientId, AccessToken],
                    _ => vec![ClientId, ClientSecret, AccessToken],
                };
                (Some(*flow), kinds)
            })
            .collect(),
    }
}

/// Environment variable names the runtime reads, for credentials and server
/// variables. With a single source both maps are flat; with several they nest
/// under the source name.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct EnvMappings {
    pub auth: JsonValue,
    pub servers: JsonValue,
}

impl EnvMappings {
    pub fn build(sources: &OpenApiSources) -> Self {
        let mut auth_by_source = BTreeMap::new();
        for (source, doc) in sources {
            let prefix = api_title_prefix(doc.title(), source);
            let mut schemes = Map::new();
            for (scheme_name, scheme) in parse_security_schemes(doc) {
                schemes.insert(scheme_name.clone(), scheme_mapping(&prefix, &scheme_name, &scheme));
            }
            if !schemes.is_empty() {
                auth_by_source.insert(source.clone(), JsonValue::Object(schemes));
            }
        }

        let server_by_source = server_env_vars(sources)
            .into_iter()
            .map(|(source, vars)| {
                let vars = vars.into_iter().map(|(k, v)| (k, JsonValue::String(v))).collect();
                (source, JsonValue::Object(vars))
            })
            .collect();

        let nested = sources.len() > 1;
        Self {
            auth: shape(auth_by_source, nested),
            servers: shape(server_by_source, nested),
        }
    }

    pub fn is_empty(&self) -> bool {
        is_empty_object(&self.auth) && is_empty_object(&self.servers)
    }
}

fn is_empty_object(v: &JsonValue) -> bool {
    v.as_object().map_or(true, Map::is_empty)
}

fn shape(by_source: BTreeMap<String, JsonValue>, nested: bool) -> JsonValue {
    if nested {
        return JsonValue::Object(by_source.into_iter().collect());
    }
    by_source
        .into_values()
        .next()
        .unwrap_or_else(|| JsonValue::Object(Map::new()))
}

fn scheme_mapping(prefix: &str, scheme_name: &str, scheme: &SecurityScheme) -> JsonValue {
    let mut out = Map::new();
    for (flow, kinds) in credential_kinds(scheme) {
        let vars: Map<String, JsonValue> = kinds
            .into_iter()
            .map(|kind| {
                (
                    kind.key().to_string(),
                    JsonValue::String(credential_env_var(prefix, scheme_name, flow, kind)),
                )
            })
            .collect();
        match flow {
            Some(flow) => {
                out.insert(flow.key().to_string(), JsonValue::Object(vars));
            }
            None => out.extend(vars),
        }
    }
    JsonValue::Object(out)
}
