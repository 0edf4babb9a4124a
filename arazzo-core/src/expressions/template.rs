use super::runtime::{parse_runtime_expr, RuntimeExprError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Expr(String),
}

/// A string with embedded `{$expr}` runtime expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub segments: Vec<Segment>,
}

impl Template {
    pub fn has_expressions(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Expr(_)))
    }

    /// The expression when the whole template is exactly one `{$expr}` token.
    pub fn single_expr(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [Segment::Expr(e)] => Some(e.as_str()),
            _ => None,
        }
    }
}

pub fn parse_template(input: &str) -> Result<Template, TemplateError> {
    let mut segments = Vec::new();
    let mut buf = String::new();
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '{' {
            buf.push(ch);
            continue;
        }

        // `{` only opens an expression when followed by `$`, so JSON text inside
        // payload templates passes through untouched.
        let mut lookahead = chars.clone();
        while lookahead.peek().is_some_and(|c| c.is_whitespace()) {
            lookahead.next();
        }
        if !matches!(lookahead.peek(), Some('$')) {
            buf.push('{');
            continue;
        }

        let mut inner = String::new();
        let mut found = false;
        for n in chars.by_ref() {
            if n == '}' {
                found = true;
                break;
            }
            inner.push(n);
        }
        if !found {
            return Err(TemplateError::UnclosedExpression);
        }

        let inner_trimmed = inner.trim();
        parse_runtime_expr(inner_trimmed).map_err(TemplateError::InvalidRuntimeExpr)?;
        if !buf.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut buf)));
        }
        segments.push(Segment::Expr(inner_trimmed.to_string()));
    }

    if !buf.is_empty() {
        segments.push(Segment::Literal(buf));
    }

    Ok(Template { segments })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("invalid runtime expression: {0}")]
    InvalidRuntimeExpr(#[from] RuntimeExprError),
    #[error("unclosed embedded expression (missing '}}')")]
    UnclosedExpression,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_literals_and_expressions() {
        let t = parse_template("Bearer {$steps.login.outputs.token}").unwrap();
        assert_eq!(
            t.segments,
            vec![
                Segment::Literal("Bearer ".into()),
                Segment::Expr("$steps.login.outputs.token".into()),
            ]
        );
        assert!(t.single_expr().is_none());
    }

    #[test]
    fn leaves_json_braces_alone() {
        let t = parse_template(r#"{"user": {$inputs.user}}"#).unwrap();
        assert_eq!(t.segments.len(), 3);
        assert_eq!(t.segments[0], Segment::Literal(r#"{"user": "#.into()));
        assert_eq!(t.segments[2], Segment::Literal("}".into()));
    }

    #[test]
    fn single_expression_template() {
        let t = parse_template("{ $inputs.items }").unwrap();
        assert_eq!(t.single_expr(), Some("$inputs.items"));
        assert_eq!(parse_template("{$inputs.x"), Err(TemplateError::UnclosedExpression));
    }
}
