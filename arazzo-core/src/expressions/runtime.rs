use std::fmt;

use super::json_pointer::{JsonPointer, JsonPointerError};

/// Parsed form of an Arazzo runtime expression such as
/// `$steps.login.outputs.items[0].id` or `$response.body#/data/0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeExpr {
    pub root: ExprRoot,
    pub segments: Vec<PathSegment>,
    pub pointer: Option<JsonPointer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprRoot {
    Url,
    Method,
    StatusCode,
    Request,
    Response,
    Inputs,
    Outputs,
    Steps,
    Workflows,
    Dependencies,
    SourceDescriptions,
    Components,
    /// Any other name, looked up in caller-supplied context (`$body`, `$headers`, ...).
    Context(String),
}

impl ExprRoot {
    fn from_name(name: &str) -> Self {
        match name {
            "url" => Self::Url,
            "method" => Self::Method,
            "statusCode" => Self::StatusCode,
            "request" => Self::Request,
            "response" => Self::Response,
            "inputs" => Self::Inputs,
            "outputs" => Self::Outputs,
            "steps" => Self::Steps,
            "workflows" => Self::Workflows,
            "dependencies" => Self::Dependencies,
            "sourceDescriptions" => Self::SourceDescriptions,
            "components" => Self::Components,
            other => Self::Context(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Url => "url",
            Self::Method => "method",
            Self::StatusCode => "statusCode",
            Self::Request => "request",
            Self::Response => "response",
            Self::Inputs => "inputs",
            Self::Outputs => "outputs",
            Self::Steps => "steps",
            Self::Workflows => "workflows",
            Self::Dependencies => "dependencies",
            Self::SourceDescriptions => "sourceDescriptions",
            Self::Components => "components",
            Self::Context(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl RuntimeExpr {
    /// True for expressions with no path and no pointer (`$statusCode`, `$response`).
    pub fn is_bare(&self) -> bool {
        self.segments.is_empty() && self.pointer.is_none()
    }

    pub fn field_at(&self, idx: usize) -> Option<&str> {
        match self.segments.get(idx) {
            Some(PathSegment::Field(f)) => Some(f.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for RuntimeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.root.name())?;
        for seg in &self.segments {
            match seg {
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        if let Some(ptr) = &self.pointer {
            write!(f, "#{}", ptr.as_str())?;
        }
        Ok(())
    }
}

pub fn parse_runtime_expr(input: &str) -> Result<RuntimeExpr, RuntimeExprError> {
    let s = input.trim();
    let body = s
        .strip_prefix('$')
        .ok_or(RuntimeExprError::MissingDollarPrefix)?;

    let (head, pointer) = match body.split_once('#') {
        Some((head, frag)) => (
            head,
            Some(JsonPointer::parse(frag).map_err(RuntimeExprError::InvalidJsonPointer)?),
        ),
        None => (body, None),
    };

    let mut segments = parse_path(head)?;
    let root = match segments.first() {
        Some(PathSegment::Field(name)) => ExprRoot::from_name(name),
        _ => return Err(RuntimeExprError::EmptyName),
    };
    segments.remove(0);

    Ok(RuntimeExpr {
        root,
        segments,
        pointer,
    })
}

fn parse_path(head: &str) -> Result<Vec<PathSegment>, RuntimeExprError> {
    let mut segments = Vec::new();
    let mut buf = String::new();
    let mut chars = head.chars().peekable();
    // Set after `]`, where a following `.` does not need a preceding name.
    let mut after_bracket = false;

    while let Some(ch) = chars.next() {
        match ch {
            '.' => {
                if buf.is_empty() && !after_bracket {
                    return Err(RuntimeExprError::EmptyName);
                }
                if !buf.is_empty() {
                    segments.push(PathSegment::Field(std::mem::take(&mut buf)));
                }
                after_bracket = false;
                if chars.peek().is_none() {
                    return Err(RuntimeExprError::EmptyName);
                }
            }
            '[' => {
                if !buf.is_empty() {
                    segments.push(PathSegment::Field(std::mem::take(&mut buf)));
                } else if segments.is_empty() {
                    return Err(RuntimeExprError::EmptyName);
                }
                let mut inner = String::new();
                let mut closed = false;
                for n in chars.by_ref() {
                    if n == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(n);
                }
                if !closed {
                    return Err(RuntimeExprError::UnclosedBracket);
                }
                segments.push(bracket_segment(inner.trim())?);
                after_bracket = true;
            }
            c if c.is_whitespace() => {
                return Err(RuntimeExprError::InvalidName(head.to_string()));
            }
            c => {
                if after_bracket {
                    return Err(RuntimeExprError::InvalidName(head.to_string()));
                }
                buf.push(c);
            }
        }
    }
    if !buf.is_empty() {
        segments.push(PathSegment::Field(buf));
    }
    if segments.is_empty() {
        return Err(RuntimeExprError::EmptyName);
    }
    Ok(segments)
}

fn bracket_segment(inner: &str) -> Result<PathSegment, RuntimeExprError> {
    if inner.is_empty() {
        return Err(RuntimeExprError::EmptyName);
    }
    let quoted = inner.len() >= 2
        && ((inner.starts_with('\'') && inner.ends_with('\''))
            || (inner.starts_with('"') && inner.ends_with('"')));
    if quoted {
        return Ok(PathSegment::Field(inner[1..inner.len() - 1].to_string()));
    }
    match inner.parse::<usize>() {
        Ok(i) => Ok(PathSegment::Index(i)),
        Err(_) => Ok(PathSegment::Field(inner.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeExprError {
    #[error("runtime expression must start with '$'")]
    MissingDollarPrefix,
    #[error("name segment must not be empty")]
    EmptyName,
    #[error("invalid name segment: {0}")]
    InvalidName(String),
    #[error("unclosed '[' in runtime expression")]
    UnclosedBracket,
    #[error("invalid json pointer: {0}")]
    InvalidJsonPointer(#[from] JsonPointerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_roots() {
        let e = parse_runtime_expr("$statusCode").unwrap();
        assert_eq!(e.root, ExprRoot::StatusCode);
        assert!(e.is_bare());

        let e = parse_runtime_expr("$body").unwrap();
        assert_eq!(e.root, ExprRoot::Context("body".to_string()));
    }

    #[test]
    fn parses_dotted_and_indexed_paths() {
        let e = parse_runtime_expr("$steps.login-step.outputs.items[0].id").unwrap();
        assert_eq!(e.root, ExprRoot::Steps);
        assert_eq!(
            e.segments,
            vec![
                PathSegment::Field("login-step".into()),
                PathSegment::Field("outputs".into()),
                PathSegment::Field("items".into()),
                PathSegment::Index(0),
                PathSegment::Field("id".into()),
            ]
        );
        assert_eq!(e.to_string(), "$steps.login-step.outputs.items[0].id");
    }

    #[test]
    fn parses_quoted_brackets_and_pointer() {
        let e = parse_runtime_expr("$response.body['user-agent']").unwrap();
        assert_eq!(e.segments[1], PathSegment::Field("user-agent".into()));

        let e = parse_runtime_expr("$response.body#/data/0").unwrap();
        assert_eq!(e.segments, vec![PathSegment::Field("body".into())]);
        assert_eq!(e.pointer.unwrap().as_str(), "/data/0");
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert_eq!(parse_runtime_expr("inputs.x"), Err(RuntimeExprError::MissingDollarPrefix));
        assert_eq!(parse_runtime_expr("$"), Err(RuntimeExprError::EmptyName));
        assert_eq!(parse_runtime_expr("$inputs..x"), Err(RuntimeExprError::EmptyName));
        assert_eq!(parse_runtime_expr("$inputs.x["), Err(RuntimeExprError::UnclosedBracket));
        assert!(parse_runtime_expr("$inputs.a b").is_err());
    }
}
