use serde::de::DeserializeOwned;

use crate::error::ParseError;
use crate::types::ArazzoDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
    Auto,
}

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub document: ArazzoDocument,
    pub format: DocumentFormat,
}

pub fn parse_document_str(input: &str, format: DocumentFormat) -> Result<ParsedDocument, ParseError> {
    let (document, format) = parse_as::<ArazzoDocument>(input, format)?;
    Ok(ParsedDocument { document, format })
}

/// Parse an OpenAPI (or any other) JSON/YAML document into a JSON value.
///
/// YAML input goes through `serde_yaml::Value` first so that non-string keys and
/// anchors are normalized before conversion.
pub fn parse_value_str(input: &str, format: DocumentFormat) -> Result<serde_json::Value, ParseError> {
    let value = match format {
        DocumentFormat::Json => serde_json::from_str::<serde_json::Value>(input)?,
        DocumentFormat::Yaml => yaml_to_json(input)?,
        DocumentFormat::Auto => {
            if looks_like_json(input) {
                match serde_json::from_str::<serde_json::Value>(input) {
                    Ok(v) => v,
                    Err(e) => yaml_to_json(input).map_err(|_| ParseError::Json(e))?,
                }
            } else {
                yaml_to_json(input)?
            }
        }
    };
    if !value.is_object() {
        return Err(ParseError::NotAMapping);
    }
    Ok(value)
}

fn yaml_to_json(input: &str) -> Result<serde_json::Value, ParseError> {
    let y = serde_yaml::from_str::<serde_yaml::Value>(input)?;
    Ok(serde_json::to_value(y)?)
}

fn looks_like_json(input: &str) -> bool {
    let trimmed = input.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

fn parse_as<T: DeserializeOwned>(
    input: &str,
    format: DocumentFormat,
) -> Result<(T, DocumentFormat), ParseError> {
    match format {
        DocumentFormat::Json => Ok((serde_json::from_str(input)?, DocumentFormat::Json)),
        DocumentFormat::Yaml => Ok((serde_yaml::from_str(input)?, DocumentFormat::Yaml)),
        DocumentFormat::Auto if looks_like_json(input) => match serde_json::from_str(input) {
            Ok(doc) => Ok((doc, DocumentFormat::Json)),
            // JSON is a YAML subset, so YAML may still accept it; report the JSON error otherwise.
            Err(e) => serde_yaml::from_str(input)
                .map(|doc| (doc, DocumentFormat::Yaml))
                .map_err(|_| ParseError::Json(e)),
        },
        DocumentFormat::Auto => match serde_yaml::from_str(input) {
            Ok(doc) => Ok((doc, DocumentFormat::Yaml)),
            Err(e) => serde_json::from_str(input)
                .map(|doc| (doc, DocumentFormat::Json))
                .map_err(|_| ParseError::Yaml(e)),
        },
    }
}
