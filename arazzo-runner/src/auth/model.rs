use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::secrets::SecretValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthType {
    ApiKey,
    Http,
    #[serde(rename = "oauth2")]
    OAuth2,
    OpenIdConnect,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthLocation {
    Header,
    Query,
    Cookie,
}

impl AuthLocation {
    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "header" => Some(Self::Header),
            "query" => Some(Self::Query),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OAuth2FlowType {
    ClientCredentials,
    AuthorizationCode,
    Implicit,
    Password,
}

impl OAuth2FlowType {
    pub const ALL: [Self; 4] = [
        Self::ClientCredentials,
        Self::AuthorizationCode,
        Self::Implicit,
        Self::Password,
    ];

    /// Key of this flow inside an OpenAPI 3 `flows` object.
    pub fn key(self) -> &'static str {
        match self {
            Self::ClientCredentials => "clientCredentials",
            Self::AuthorizationCode => "authorizationCode",
            Self::Implicit => "implicit",
            Self::Password => "password",
        }
    }

    /// Environment variable suffix, e.g. `CLIENT_CREDENTIALS`.
    pub fn env_suffix(self) -> &'static str {
        match self {
            Self::ClientCredentials => "CLIENT_CREDENTIALS",
            Self::AuthorizationCode => "AUTHORIZATION_CODE",
            Self::Implicit => "IMPLICIT",
            Self::Password => "PASSWORD",
        }
    }
}

/// One authentication need extracted from an OpenAPI source.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AuthRequirement {
    pub auth_type: AuthType,
    /// Key of the security scheme in the source document.
    pub scheme_name: String,
    /// Parameter name for apiKey schemes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<AuthLocation>,
    /// HTTP auth scheme (`bearer`, `basic`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_scheme: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_type: Option<OAuth2FlowType>,
    /// Flow or discovery URLs keyed by kind (`tokenUrl`, `authorizationUrl`, `openIdConnectUrl`).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub auth_urls: BTreeMap<String, String>,
    pub source_description_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpAuthScheme {
    Basic,
    Bearer,
    Other(String),
}

impl HttpAuthScheme {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Self::Basic,
            "bearer" => Self::Bearer,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuth2Flow {
    pub authorization_url: Option<String>,
    pub token_url: Option<String>,
    pub refresh_url: Option<String>,
    pub scopes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuth2Flows {
    pub flows: BTreeMap<OAuth2FlowType, OAuth2Flow>,
}

impl OAuth2Flows {
    pub fn get(&self, flow: OAuth2FlowType) -> Option<&OAuth2Flow> {
        self.flows.get(&flow)
    }
}

/// A security scheme declared by an OpenAPI source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityScheme {
    ApiKey {
        name: String,
        location: AuthLocation,
    },
    Http {
        scheme: HttpAuthScheme,
        bearer_format: Option<String>,
    },
    OAuth2 {
        flows: OAuth2Flows,
    },
    OpenIdConnect {
        url: String,
    },
    /// Any other scheme type; credentials are sent in a header.
    Custom {
        scheme_type: String,
        header: String,
    },
}

impl SecurityScheme {
    pub fn auth_type(&self) -> AuthType {
        match self {
            Self::ApiKey { .. } => AuthType::ApiKey,
            Self::Http { .. } => AuthType::Http,
            Self::OAuth2 { .. } => AuthType::OAuth2,
            Self::OpenIdConnect { .. } => AuthType::OpenIdConnect,
            Self::Custom { .. } => AuthType::Custom,
        }
    }
}

/// One entry of a `security` list: every requirement must be satisfied.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SecurityOption {
    pub requirements: Vec<SecurityRequirement>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SecurityRequirement {
    pub scheme_name: String,
    pub scopes: Vec<String>,
}

impl SecurityOption {
    /// Parse an OpenAPI `security` array. Options are alternatives (OR); the
    /// schemes inside one option are all required (AND).
    pub fn parse_list(security: &JsonValue) -> Vec<SecurityOption> {
        let Some(options) = security.as_array() else {
            return Vec::new();
        };
        options
            .iter()
            .filter_map(|opt| opt.as_object())
            .map(|opt| SecurityOption {
                requirements: opt
                    .iter()
                    .map(|(scheme, scopes)| SecurityRequirement {
                        scheme_name: scheme.clone(),
                        scopes: scopes
                            .as_array()
                            .map(|s| s.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                            .unwrap_or_default(),
                    })
                    .collect(),
            })
            .collect()
    }

    pub fn is_anonymous(&self) -> bool {
        self.requirements.is_empty()
    }
}

/// A concrete credential resolved for one scheme.
#[derive(Debug, Clone)]
pub enum AuthValue {
    Bearer(SecretValue),
    Basic {
        username: String,
        password: SecretValue,
    },
    ApiKey(SecretValue),
    OAuth2AccessToken(SecretValue),
    OpenIdConnect(SecretValue),
    Custom(SecretValue),
}

/// A credential ready to be placed on a request.
#[derive(Debug, Clone)]
pub struct RequestAuthValue {
    pub location: AuthLocation,
    pub name: String,
    pub value: SecretValue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_or_of_and_security() {
        let opts = SecurityOption::parse_list(&json!([
            {"api_key": [], "oauth": ["read", "write"]},
            {}
        ]));
        assert_eq!(opts.len(), 2);
        assert_eq!(opts[0].requirements.len(), 2);
        assert_eq!(opts[0].requirements[1].scopes, vec!["read", "write"]);
        assert!(opts[1].is_anonymous());
    }
}
