use arazzo_core::expressions::{JsonPointer, JsonPointerError};

/// How an `operationPath` names its OpenAPI document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Name(String),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationPathRef {
    pub source: SourceRef,
    pub pointer: JsonPointer,
}

/// Parse an Arazzo `operationPath`, e.g.
/// `{$sourceDescriptions.petStore.url}#/paths/~1pet~1findByStatus/get`.
pub fn parse_operation_path(op_path: &str) -> Result<OperationPathRef, JsonPointerError> {
    let (before, after) = op_path.split_once('#').unwrap_or((op_path, ""));
    let pointer = JsonPointer::parse(after)?;

    let mut src = before.trim();
    if let Some(inner) = src.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        src = inner.trim();
    }
    let source = match src.strip_prefix("$sourceDescriptions.") {
        Some(rest) => SourceRef::Name(rest.strip_suffix(".url").unwrap_or(rest).to_string()),
        None if src.contains("://") || src.contains('/') || src.ends_with(".json") || src.ends_with(".yaml") || src.ends_with(".yml") => {
            SourceRef::Url(src.to_string())
        }
        None => SourceRef::Name(src.to_string()),
    };

    Ok(OperationPathRef { source, pointer })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_template_and_pointer() {
        let r = parse_operation_path("{$sourceDescriptions.petStore.url}#/paths/~1pet~1findByStatus/get").unwrap();
        assert_eq!(r.source, SourceRef::Name("petStore".into()));
        assert_eq!(r.pointer.tokens(), vec!["paths", "/pet/findByStatus", "get"]);
    }

    #[test]
    fn parses_url_sources() {
        let r = parse_operation_path("https://api.example.com/openapi.json#/paths/~1users/post").unwrap();
        assert_eq!(r.source, SourceRef::Url("https://api.example.com/openapi.json".into()));
    }

    #[test]
    fn rejects_bad_pointer() {
        assert!(parse_operation_path("{$sourceDescriptions.x.url}#paths").is_err());
    }
}
