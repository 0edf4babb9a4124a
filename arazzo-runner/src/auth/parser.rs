use std::collections::BTreeMap;

use serde_json::{json, Map, Value as JsonValue};

use crate::auth::model::{
    AuthLocation, AuthRequirement, HttpAuthScheme, OAuth2Flow, OAuth2FlowType, OAuth2Flows,
    SecurityScheme,
};
use crate::openapi::{deref, OpenApiDoc};

/// Security schemes of a document in OpenAPI 3 shape. Swagger 2
/// `securityDefinitions` are converted (`basic` to http basic, oauth2 `flow`
/// to the matching `flows` entry).
pub fn normalize_security_schemes(doc: &OpenApiDoc) -> Map<String, JsonValue> {
    if let Some(schemes) = doc
        .raw
        .pointer("/components/securitySchemes")
        .and_then(|s| s.as_object())
    {
        return schemes
            .iter()
            .map(|(name, raw)| {
                let resolved = deref(&doc.raw, raw).cloned().unwrap_or_else(|_| raw.clone());
                (name.clone(), resolved)
            })
            .collect();
    }
    let Some(defs) = doc.raw.get("securityDefinitions").and_then(|s| s.as_object()) else {
        return Map::new();
    };
    defs.iter()
        .map(|(name, def)| (name.clone(), convert_v2_scheme(def)))
        .collect()
}

fn convert_v2_scheme(def: &JsonValue) -> JsonValue {
    let mut out = def.as_object().cloned().unwrap_or_default();
    match def.get("type").and_then(|t| t.as_str()) {
        Some("basic") => {
            out.insert("type".into(), json!("http"));
            out.insert("scheme".into(), json!("basic"));
        }
        Some("oauth2") => {
            let flow_key = match def.get("flow").and_then(|f| f.as_str()) {
                Some("application") => "clientCredentials",
                Some("accessCode") => "authorizationCode",
                Some("implicit") => "implicit",
                Some("password") => "password",
                _ => return JsonValue::Object(out),
            };
            let mut flow = Map::new();
            for key in ["authorizationUrl", "tokenUrl", "refreshUrl"] {
                if let Some(v) = out.remove(key) {
                    flow.insert(key.into(), v);
                }
            }
            flow.insert("scopes".into(), out.remove("scopes").unwrap_or_else(|| json!({})));
            out.remove("flow");
            out.insert("flows".into(), json!({ flow_key: flow }));
        }
        _ => {}
    }
    JsonValue::Object(out)
}

/// Parse one OpenAPI 3 security scheme object.
pub fn parse_security_scheme(raw: &JsonValue) -> Option<SecurityScheme> {
    let str_field = |key: &str| raw.get(key).and_then(|v| v.as_str()).map(str::to_string);
    let scheme_type = str_field("type")?;
    let scheme = match scheme_type.as_str() {
        "apiKey" => SecurityScheme::ApiKey {
            name: str_field("name")?,
            location: str_field("in")
                .as_deref()
                .and_then(AuthLocation::parse)
                .unwrap_or(AuthLocation::Header),
        },
        "http" => SecurityScheme::Http {
            scheme: HttpAuthScheme::parse(str_field("scheme").as_deref().unwrap_or("bearer")),
            bearer_format: str_field("bearerFormat"),
        },
        "oauth2" => SecurityScheme::OAuth2 {
            flows: parse_flows(raw.get("flows")),
        },
        "openIdConnect" => SecurityScheme::OpenIdConnect {
            url: str_field("openIdConnectUrl").unwrap_or_default(),
        },
        other => SecurityScheme::Custom {
            scheme_type: other.to_string(),
            header: str_field("name").unwrap_or_else(|| "Authorization".to_string()),
        },
    };
    Some(scheme)
}

fn parse_flows(raw: Option<&JsonValue>) -> OAuth2Flows {
    let mut flows = BTreeMap::new();
    let Some(raw) = raw.and_then(|f| f.as_object()) else {
        return OAuth2Flows { flows };
    };
    for flow_type in OAuth2FlowType::ALL {
        let Some(flow) = raw.get(flow_type.key()) else {
            continue;
        };
        let url = |key: &str| flow.get(key).and_then(|v| v.as_str()).map(str::to_string);
        flows.insert(
            flow_type,
            OAuth2Flow {
                authorization_url: url("authorizationUrl"),
                token_url: url("tokenUrl"),
                refresh_url: url("refreshUrl"),
                scopes: flow
                    .get("scopes")
                    .and_then(|s| s.as_object())
                    .map(|s| {
                        s.iter()
                            .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                            .collect()
                    })
                    .unwrap_or_default(),
            },
        );
    }
    OAuth2Flows { flows }
}

/// Every parseable security scheme of a document, by scheme name.
pub fn parse_security_schemes(doc: &OpenApiDoc) -> BTreeMap<String, SecurityScheme> {
    normalize_security_schemes(doc)
        .iter()
        .filter_map(|(name, raw)| match parse_security_scheme(raw) {
            Some(scheme) => Some((name.clone(), scheme)),
            None => {
                tracing::warn!(scheme = %name, "skipping malformed security scheme");
                None
            }
        })
        .collect()
}

/// Authentication requirements declared by one source. OAuth2 schemes yield
/// one requirement per flow.
pub fn extract_auth_requirements(source_id: &str, doc: &OpenApiDoc) -> Vec<AuthRequirement> {
    let normalized = normalize_security_schemes(doc);
    let api_title = doc.title().map(str::to_string);
    let mut out = Vec::new();

    for (scheme_name, raw) in &normalized {
        let Some(scheme) = parse_security_scheme(raw) else {
            continue;
        };
        let base = AuthRequirement {
            auth_type: scheme.auth_type(),
            scheme_name: scheme_name.clone(),
            name: None,
            location: None,
            http_scheme: None,
            scopes: Vec::new(),
            flow_type: None,
            auth_urls: BTreeMap::new(),
            source_description_id: source_id.to_string(),
            api_title: api_title.clone(),
            description: raw.get("description").and_then(|d| d.as_str()).map(str::to_string),
        };
        match scheme {
            SecurityScheme::ApiKey { name, location } => out.push(AuthRequirement {
                name: Some(name),
                location: Some(location),
                ..base
            }),
            SecurityScheme::Http { scheme, .. } => {
                let http_scheme = match scheme {
                    HttpAuthScheme::Basic => "basic".to_string(),
                    HttpAuthScheme::Bearer => "bearer".to_string(),
                    HttpAuthScheme::Other(s) => s,
                };
                out.push(AuthRequirement {
                    location: Some(AuthLocation::Header),
                    http_scheme: Some(http_scheme),
                    ..base
                });
            }
            SecurityScheme::OAuth2 { flows } => {
                for (flow_type, flow) in flows.flows {
                    let mut auth_urls = BTreeMap::new();
                    if let Some(u) = flow.authorization_url {
                        auth_urls.insert("authorizationUrl".to_string(), u);
                    }
                    if let Some(u) = flow.token_url {
                        auth_urls.insert("tokenUrl".to_string(), u);
                    }
                    if let Some(u) = flow.refresh_url {
                        auth_urls.insert("refreshUrl".to_string(), u);
                    }
                    out.push(AuthRequirement {
                        location: Some(AuthLocation::Header),
                        scopes: flow.scopes.into_keys().collect(),
                        flow_type: Some(flow_type),
                        auth_urls,
                        ..base.clone()
                    });
                }
            }
            SecurityScheme::OpenIdConnect { url } => out.push(AuthRequirement {
                location: Some(AuthLocation::Header),
                auth_urls: BTreeMap::from([("openIdConnectUrl".to_string(), url)]),
                ..base
            }),
            SecurityScheme::Custom { header, .. } => out.push(AuthRequirement {
                name: Some(header),
                location: Some(AuthLocation::Header),
                ..base
            }),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthType;

    #[test]
    fn converts_swagger2_definitions() {
        let doc = OpenApiDoc::new(
            "petstore.json",
            json!({
                "swagger": "2.0",
                "securityDefinitions": {
                    "basicAuth": {"type": "basic"},
                    "petstore_auth": {
                        "type": "oauth2",
                        "flow": "application",
                        "tokenUrl": "https://auth.example.com/token",
                        "scopes": {"read:pets": "read"}
                    }
                }
            }),
        );
        let schemes = parse_security_schemes(&doc);
        assert_eq!(
            schemes["basicAuth"],
            SecurityScheme::Http {
                scheme: HttpAuthScheme::Basic,
                bearer_format: None
            }
        );
        let SecurityScheme::OAuth2 { flows } = &schemes["petstore_auth"] else {
            panic!("expected oauth2");
        };
        let cc = flows.get(OAuth2FlowType::ClientCredentials).unwrap();
        assert_eq!(cc.token_url.as_deref(), Some("https://auth.example.com/token"));
    }

    #[test]
    fn oauth2_yields_one_requirement_per_flow() {
        let doc = OpenApiDoc::new(
            "spotify.yaml",
            json!({
                "openapi": "3.0.0",
                "info": {"title": "Spotify Web API"},
                "components": {"securitySchemes": {
                    "oauth2": {"type": "oauth2", "flows": {
                        "clientCredentials": {"tokenUrl": "https://accounts.spotify.com/api/token", "scopes": {}},
                        "authorizationCode": {
                            "authorizationUrl": "https://accounts.spotify.com/authorize",
                            "tokenUrl": "https://accounts.spotify.com/api/token",
                            "scopes": {"user-read-private": ""}
                        }
                    }},
                    "api_key": {"type": "apiKey", "name": "X-API-Key", "in": "header"}
                }}
            }),
        );
        let reqs = extract_auth_requirements("spotify", &doc);
        assert_eq!(reqs.len(), 3);
        let oauth: Vec<_> = reqs.iter().filter(|r| r.auth_type == AuthType::OAuth2).collect();
        assert_eq!(oauth.len(), 2);
        assert!(oauth.iter().all(|r| r.api_title.as_deref() == Some("Spotify Web API")));
        let key = reqs.iter().find(|r| r.auth_type == AuthType::ApiKey).unwrap();
        assert_eq!(key.name.as_deref(), Some("X-API-Key"));
    }
}
