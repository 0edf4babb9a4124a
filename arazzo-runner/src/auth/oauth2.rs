use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::executor::{HttpClient, HttpError, HttpRequestParts};
use crate::secrets::SecretValue;

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: SecretValue,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token url '{url}': {message}")]
    InvalidUrl { url: String, message: String },
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("token endpoint returned status {status}")]
    Status { status: u16 },
    #[error("token response is not valid JSON: {0}")]
    InvalidResponse(String),
    #[error("token response has no access_token")]
    MissingAccessToken,
}

/// Request a token with the OAuth2 client credentials grant.
pub async fn fetch_client_credentials_token(
    client: &dyn HttpClient,
    token_url: &str,
    client_id: &str,
    client_secret: &SecretValue,
    scopes: &[String],
    timeout: Duration,
    max_response_bytes: usize,
) -> Result<AccessToken, TokenError> {
    let url = url::Url::parse(token_url).map_err(|e| TokenError::InvalidUrl {
        url: token_url.to_string(),
        message: e.to_string(),
    })?;

    // The serializer is not `Send`; finish it before the request is awaited.
    let body = {
        let secret = String::from_utf8_lossy(client_secret.expose_bytes());
        let mut form = url::form_urlencoded::Serializer::new(String::new());
        form.append_pair("grant_type", "client_credentials");
        form.append_pair("client_id", client_id);
        form.append_pair("client_secret", &secret);
        if !scopes.is_empty() {
            form.append_pair("scope", &scopes.join(" "));
        }
        form.finish().into_bytes()
    };

    let headers = BTreeMap::from([
        ("Content-Type".to_string(), "application/x-www-form-urlencoded".to_string()),
        ("Accept".to_string(), "application/json".to_string()),
    ]);
    let resp = client
        .send(
            HttpRequestParts {
                method: "POST".to_string(),
                url,
                headers,
                body,
            },
            timeout,
            max_response_bytes,
        )
        .await?;
    if !(200..300).contains(&resp.status) {
        return Err(TokenError::Status { status: resp.status });
    }

    let json: JsonValue =
        serde_json::from_slice(&resp.body).map_err(|e| TokenError::InvalidResponse(e.to_string()))?;
    let token = json
        .get("access_token")
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
        .ok_or(TokenError::MissingAccessToken)?;
    Ok(AccessToken {
        token: SecretValue::from_string(token.to_string()),
        token_type: json.get("token_type").and_then(|t| t.as_str()).map(str::to_string),
        expires_in: json.get("expires_in").and_then(|t| t.as_u64()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>(_: T) {}

    // Compiles only while the token request future can cross threads.
    #[allow(dead_code)]
    fn token_request_future_is_send(client: &dyn HttpClient, secret: &SecretValue) {
        let scopes = vec!["read".to_string()];
        assert_send(fetch_client_credentials_token(
            client,
            "https://auth.example.com/token",
            "cid",
            secret,
            &scopes,
            Duration::from_secs(5),
            1024,
        ));
    }
}
