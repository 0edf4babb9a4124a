use serde_json::Value as JsonValue;

/// An RFC 6901 JSON pointer (`""` or `/a/b/0`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPointer {
    raw: String,
}

impl JsonPointer {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parse a pointer fragment. A leading `#` is accepted and stripped, so both
    /// `/a/b` and `#/a/b` parse to the same pointer.
    pub fn parse(fragment: &str) -> Result<Self, JsonPointerError> {
        let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
        if fragment.is_empty() {
            return Ok(Self {
                raw: String::new(),
            });
        }
        if !fragment.starts_with('/') {
            return Err(JsonPointerError::InvalidPrefix);
        }

        // Only "~0" and "~1" are valid escapes.
        let mut chars = fragment.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '~' {
                match chars.next() {
                    Some('0' | '1') => {}
                    _ => return Err(JsonPointerError::InvalidEscape),
                }
            }
        }

        Ok(Self {
            raw: fragment.to_string(),
        })
    }

    /// Build a pointer from already-decoded reference tokens.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut raw = String::new();
        for t in tokens {
            raw.push('/');
            raw.push_str(&escape_token(t.as_ref()));
        }
        Self { raw }
    }

    /// Decoded reference tokens, in order.
    pub fn tokens(&self) -> Vec<String> {
        if self.raw.is_empty() {
            return Vec::new();
        }
        self.raw[1..].split('/').map(decode_token).collect()
    }

    pub fn is_root(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn resolve<'a>(&self, value: &'a JsonValue) -> Option<&'a JsonValue> {
        value.pointer(&self.raw)
    }

    /// Write `new_value` at this pointer, creating intermediate objects as needed.
    ///
    /// Array targets accept a numeric index (replace, or append when equal to the
    /// length) and `-` (append).
    pub fn assign(&self, target: &mut JsonValue, new_value: JsonValue) -> Result<(), JsonPointerError> {
        let tokens = self.tokens();
        let Some((last, parents)) = tokens.split_last() else {
            *target = new_value;
            return Ok(());
        };

        let mut cur = target;
        for token in parents {
            cur = step_mut(cur, token)?;
        }
        if cur.is_null() {
            *cur = JsonValue::Object(serde_json::Map::new());
        }

        match cur {
            JsonValue::Object(map) => {
                map.insert(last.clone(), new_value);
                Ok(())
            }
            JsonValue::Array(arr) => {
                if last == "-" {
                    arr.push(new_value);
                    return Ok(());
                }
                let idx: usize = last
                    .parse()
                    .map_err(|_| JsonPointerError::InvalidArrayIndex(last.clone()))?;
                if idx < arr.len() {
                    arr[idx] = new_value;
                    Ok(())
                } else if idx == arr.len() {
                    arr.push(new_value);
                    Ok(())
                } else {
                    Err(JsonPointerError::IndexOutOfBounds(idx))
                }
            }
            _ => Err(JsonPointerError::NotAContainer(self.raw.clone())),
        }
    }
}

fn step_mut<'a>(cur: &'a mut JsonValue, token: &str) -> Result<&'a mut JsonValue, JsonPointerError> {
    if cur.is_null() {
        *cur = JsonValue::Object(serde_json::Map::new());
    }
    match cur {
        JsonValue::Object(map) => Ok(map
            .entry(token.to_string())
            .or_insert(JsonValue::Null)),
        JsonValue::Array(arr) => {
            let idx: usize = token
                .parse()
                .map_err(|_| JsonPointerError::InvalidArrayIndex(token.to_string()))?;
            arr.get_mut(idx).ok_or(JsonPointerError::IndexOutOfBounds(idx))
        }
        _ => Err(JsonPointerError::NotAContainer(token.to_string())),
    }
}

pub fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

pub fn decode_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JsonPointerError {
    #[error("json pointer must start with '/'")]
    InvalidPrefix,
    #[error("json pointer contains invalid escape (only ~0 and ~1 are allowed)")]
    InvalidEscape,
    #[error("invalid array index in json pointer: {0}")]
    InvalidArrayIndex(String),
    #[error("array index {0} is out of bounds")]
    IndexOutOfBounds(usize),
    #[error("cannot descend into a scalar value at {0}")]
    NotAContainer(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_with_and_without_hash() {
        assert_eq!(JsonPointer::parse("#/a/b").unwrap(), JsonPointer::parse("/a/b").unwrap());
        assert!(JsonPointer::parse("a/b").is_err());
        assert!(JsonPointer::parse("/a~2").is_err());
    }

    #[test]
    fn tokens_are_decoded() {
        let p = JsonPointer::parse("/paths/~1pets~1{id}/get").unwrap();
        assert_eq!(p.tokens(), vec!["paths", "/pets/{id}", "get"]);
        assert_eq!(JsonPointer::from_tokens(p.tokens()), p);
    }

    #[test]
    fn assign_creates_intermediate_objects() {
        let mut v = json!({"a": {"list": [1, 2]}});
        JsonPointer::parse("/a/b/c").unwrap().assign(&mut v, json!("x")).unwrap();
        JsonPointer::parse("/a/list/1").unwrap().assign(&mut v, json!(9)).unwrap();
        JsonPointer::parse("/a/list/-").unwrap().assign(&mut v, json!(3)).unwrap();
        assert_eq!(v, json!({"a": {"b": {"c": "x"}, "list": [1, 9, 3]}}));
    }
}
