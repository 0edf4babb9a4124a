use std::collections::BTreeMap;
use std::path::Path;

use arazzo_core::types::ArazzoDocument;
use arazzo_core::{parse_document_str, parse_value_str, DocumentFormat, ParseError};

use crate::openapi::model::{OpenApiDoc, OpenApiSources};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },
    #[error("failed to parse {location}: {source}")]
    Parse {
        location: String,
        #[source]
        source: ParseError,
    },
}

fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load an OpenAPI document from an http(s) URL or a file path.
pub async fn load_openapi(client: &reqwest::Client, location: &str) -> Result<OpenApiDoc, LoadError> {
    let body = if is_url(location) {
        let fetch_err = |message: String| LoadError::Fetch {
            url: location.to_string(),
            message,
        };
        let resp = client
            .get(location)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {status}")));
        }
        resp.text().await.map_err(|e| fetch_err(e.to_string()))?
    } else {
        std::fs::read_to_string(location).map_err(|source| LoadError::Io {
            path: location.to_string(),
            source,
        })?
    };
    let raw = parse_value_str(&body, DocumentFormat::Auto).map_err(|source| LoadError::Parse {
        location: location.to_string(),
        source,
    })?;
    Ok(OpenApiDoc::new(location, raw))
}

pub fn load_arazzo_file(path: &Path) -> Result<ArazzoDocument, LoadError> {
    let display = path.display().to_string();
    let body = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: display.clone(),
        source,
    })?;
    parse_document_str(&body, DocumentFormat::Auto)
        .map(|parsed| parsed.document)
        .map_err(|source| LoadError::Parse {
            location: display,
            source,
        })
}

/// Resolve a source description URL against the location of the Arazzo
/// document that references it.
pub fn resolve_location(base: Option<&str>, location: &str) -> String {
    if is_url(location) || Path::new(location).is_absolute() {
        return location.to_string();
    }
    match base {
        Some(b) if is_url(b) => url::Url::parse(b)
            .and_then(|u| u.join(location))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| location.to_string()),
        Some(b) => Path::new(b)
            .parent()
            .map(|dir| dir.join(location).display().to_string())
            .unwrap_or_else(|| location.to_string()),
        None => location.to_string(),
    }
}

/// Load every OpenAPI source description of `document`.
///
/// `overrides` maps source names to explicit locations; other sources are
/// resolved relative to `base` (the Arazzo document's own location).
pub async fn load_sources(
    client: &reqwest::Client,
    document: &ArazzoDocument,
    base: Option<&str>,
    overrides: &BTreeMap<String, String>,
) -> Result<OpenApiSources, LoadError> {
    let mut out = OpenApiSources::new();
    for src in document.openapi_sources() {
        let location = match overrides.get(&src.name) {
            Some(loc) => loc.clone(),
            None => resolve_location(base, &src.url),
        };
        tracing::debug!(source = %src.name, %location, "loading OpenAPI source");
        out.insert(src.name.clone(), load_openapi(client, &location).await?);
    }
    for name in overrides.keys().filter(|n| !out.contains_key(*n)) {
        tracing::warn!(source = %name, "override does not match any OpenAPI source description");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_locations() {
        assert_eq!(
            resolve_location(Some("/work/flows/arazzo.yaml"), "petstore.yaml"),
            "/work/flows/petstore.yaml"
        );
        assert_eq!(
            resolve_location(Some("https://example.com/specs/arazzo.yaml"), "./pets.json"),
            "https://example.com/specs/pets.json"
        );
        assert_eq!(
            resolve_location(Some("/work/a.yaml"), "https://x.test/openapi.json"),
            "https://x.test/openapi.json"
        );
    }
}
