use std::collections::HashSet;

use serde_json::Value as JsonValue;

pub(crate) fn resolve_ref<'a>(
    doc: &'a JsonValue,
    ref_str: &str,
    visited: &mut HashSet<String>,
) -> Result<&'a JsonValue, RefError> {
    // Only local refs: "#/..."
    if !ref_str.starts_with('#') {
        return Err(RefError::ExternalRef(ref_str.to_string()));
    }

    let pointer = ref_str.trim_start_matches('#');
    if !visited.insert(ref_str.to_string()) {
        return Err(RefError::Cycle(ref_str.to_string()));
    }

    doc.pointer(pointer)
        .ok_or_else(|| RefError::NotFound(ref_str.to_string()))
}

/// Follow `$ref` chains from `value` until a non-reference object is reached.
pub fn deref<'a>(doc: &'a JsonValue, value: &'a JsonValue) -> Result<&'a JsonValue, RefError> {
    let mut visited = HashSet::new();
    let mut cur = value;
    while let Some(r) = cur.get("$ref").and_then(|v| v.as_str()) {
        cur = resolve_ref(doc, r, &mut visited)?;
    }
    Ok(cur)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefError {
    #[error("unsupported external $ref: {0}")]
    ExternalRef(String),
    #[error("unresolvable $ref: {0}")]
    NotFound(String),
    #[error("cyclic $ref: {0}")]
    Cycle(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn follows_chains_and_detects_cycles() {
        let doc = json!({
            "components": {
                "a": {"$ref": "#/components/b"},
                "b": {"name": "x"},
                "loop1": {"$ref": "#/components/loop2"},
                "loop2": {"$ref": "#/components/loop1"}
            }
        });
        let v = json!({"$ref": "#/components/a"});
        assert_eq!(deref(&doc, &v).unwrap(), &json!({"name": "x"}));

        let cyclic = json!({"$ref": "#/components/loop1"});
        assert!(matches!(deref(&doc, &cyclic), Err(RefError::Cycle(_))));

        let external = json!({"$ref": "other.yaml#/x"});
        assert!(matches!(deref(&doc, &external), Err(RefError::ExternalRef(_))));
    }
}
