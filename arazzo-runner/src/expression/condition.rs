use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value as JsonValue;

static EMBEDDED_EXPR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\$[A-Za-z_][A-Za-z0-9_.\-]*(\[[^\]]*\])*(#[^\s()]*)?"#).expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "==" | "===" => Some(Self::Eq),
            "!=" | "!==" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }
}

/// Parsed boolean condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Or(Box<Condition>, Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    Compare(CmpOp, Box<Condition>, Box<Condition>),
    Literal(JsonValue),
    /// A `$` runtime expression, resolved at evaluation time.
    Expr(String),
}

impl Condition {
    pub fn eval(&self, resolve: &dyn Fn(&str) -> JsonValue) -> JsonValue {
        match self {
            Self::Or(a, b) => JsonValue::Bool(truthy(&a.eval(resolve)) || truthy(&b.eval(resolve))),
            Self::And(a, b) => JsonValue::Bool(truthy(&a.eval(resolve)) && truthy(&b.eval(resolve))),
            Self::Not(a) => JsonValue::Bool(!truthy(&a.eval(resolve))),
            Self::Compare(op, a, b) => JsonValue::Bool(compare(*op, &a.eval(resolve), &b.eval(resolve))),
            Self::Literal(v) => v.clone(),
            Self::Expr(e) => resolve(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    #[error("empty condition")]
    Empty,
    #[error("unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("unexpected end of condition")]
    UnexpectedEnd,
}

/// Evaluate a boolean condition such as `$statusCode == 200 && $response.body#/ok`.
///
/// When the condition does not parse as written, every embedded runtime
/// expression is replaced by its JSON-encoded value and the result is parsed
/// once more.
pub fn evaluate_condition(
    input: &str,
    resolve: &dyn Fn(&str) -> JsonValue,
) -> Result<bool, ConditionError> {
    match parse_condition(input) {
        Ok(cond) => Ok(truthy(&cond.eval(resolve))),
        Err(first) => {
            let substituted = EMBEDDED_EXPR
                .replace_all(input, |caps: &regex::Captures<'_>| {
                    serde_json::to_string(&resolve(&caps[0])).unwrap_or_else(|_| "null".to_string())
                })
                .into_owned();
            if substituted == input {
                return Err(first);
            }
            tracing::debug!(condition = input, "condition re-parsed after expression substitution");
            parse_condition(&substituted)
                .map(|cond| truthy(&cond.eval(resolve)))
                .map_err(|_| first)
        }
    }
}

pub fn parse_condition(input: &str) -> Result<Condition, ConditionError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ConditionError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let cond = parser.parse_or()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(cond),
        Some(t) => Err(ConditionError::UnexpectedToken(format!("{t:?}"))),
    }
}

/// JavaScript-style truthiness.
pub fn truthy(v: &JsonValue) -> bool {
    match v {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => true,
    }
}

/// Loose comparison: numeric strings compare equal to numbers, ordering is
/// numeric when both sides coerce to numbers and lexicographic for two strings.
pub fn compare(op: CmpOp, a: &JsonValue, b: &JsonValue) -> bool {
    match op {
        CmpOp::Eq => loose_eq(a, b),
        CmpOp::Ne => !loose_eq(a, b),
        CmpOp::Lt => loose_cmp(a, b).is_some_and(Ordering::is_lt),
        CmpOp::Le => loose_cmp(a, b).is_some_and(Ordering::is_le),
        CmpOp::Gt => loose_cmp(a, b).is_some_and(Ordering::is_gt),
        CmpOp::Ge => loose_cmp(a, b).is_some_and(Ordering::is_ge),
    }
}

fn loose_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        (JsonValue::Number(n), JsonValue::String(s)) | (JsonValue::String(s), JsonValue::Number(n)) => {
            s.trim().parse::<f64>().ok() == n.as_f64()
        }
        (JsonValue::Bool(x), JsonValue::String(s)) | (JsonValue::String(s), JsonValue::Bool(x)) => {
            s == if *x { "true" } else { "false" }
        }
        _ => a == b,
    }
}

fn loose_cmp(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    if let (JsonValue::String(x), JsonValue::String(y)) = (a, b) {
        if let (Ok(x), Ok(y)) = (x.trim().parse::<f64>(), y.trim().parse::<f64>()) {
            return x.partial_cmp(&y);
        }
        return Some(x.cmp(y));
    }
    as_number(a)?.partial_cmp(&as_number(b)?)
}

fn as_number(v: &JsonValue) -> Option<f64> {
    match v {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        JsonValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Cmp(CmpOp),
    Literal(JsonValue),
    Expr(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let mut tokens = Vec::new();
    let mut pos = 0;
    while let Some(c) = input[pos..].chars().next() {
        let rest = &input[pos..];
        if c.is_whitespace() {
            pos += c.len_utf8();
            continue;
        }
        let (token, len) = match c {
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            '&' if rest.starts_with("&&") => (Token::And, 2),
            '|' if rest.starts_with("||") => (Token::Or, 2),
            '=' if rest.starts_with("===") => (Token::Cmp(CmpOp::Eq), 3),
            '=' if rest.starts_with("==") => (Token::Cmp(CmpOp::Eq), 2),
            '!' if rest.starts_with("!==") => (Token::Cmp(CmpOp::Ne), 3),
            '!' if rest.starts_with("!=") => (Token::Cmp(CmpOp::Ne), 2),
            '!' => (Token::Not, 1),
            '<' if rest.starts_with("<=") => (Token::Cmp(CmpOp::Le), 2),
            '<' => (Token::Cmp(CmpOp::Lt), 1),
            '>' if rest.starts_with(">=") => (Token::Cmp(CmpOp::Ge), 2),
            '>' => (Token::Cmp(CmpOp::Gt), 1),
            '\'' | '"' => string_literal(rest, c)?,
            '[' | '{' => json_literal(rest).ok_or(ConditionError::UnexpectedChar(c, pos))?,
            '$' => expression(rest),
            '-' | '0'..='9' => number(rest).ok_or(ConditionError::UnexpectedChar(c, pos))?,
            c if c.is_alphabetic() || c == '_' => word(rest),
            other => return Err(ConditionError::UnexpectedChar(other, pos)),
        };
        tokens.push(token);
        pos += len;
    }
    Ok(tokens)
}

fn string_literal(rest: &str, quote: char) -> Result<(Token, usize), ConditionError> {
    let mut out = String::new();
    let mut chars = rest.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, other)) => out.push(other),
                None => return Err(ConditionError::UnterminatedString),
            },
            c if c == quote => return Ok((Token::Literal(JsonValue::String(out)), i + 1)),
            c => out.push(c),
        }
    }
    Err(ConditionError::UnterminatedString)
}

fn json_literal(rest: &str) -> Option<(Token, usize)> {
    let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<JsonValue>();
    let value = stream.next()?.ok()?;
    Some((Token::Literal(value), stream.byte_offset()))
}

fn expression(rest: &str) -> (Token, usize) {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut end = rest.len();
    for (i, c) in rest.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '\'' | '"' if depth > 0 => quote = Some(c),
            c if depth == 0 && (c.is_whitespace() || "()=!<>&|,".contains(c)) => {
                end = i;
                break;
            }
            _ => {}
        }
    }
    (Token::Expr(rest[..end].to_string()), end)
}

fn number(rest: &str) -> Option<(Token, usize)> {
    let end = rest
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+') || (*c == '-' && (*i == 0 || rest[..*i].ends_with(['e', 'E'])))))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    let value = serde_json::from_str::<JsonValue>(&rest[..end]).ok()?;
    value.is_number().then_some((Token::Literal(value), end))
}

fn word(rest: &str) -> (Token, usize) {
    let end = rest
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.')))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    let w = &rest[..end];
    let token = match w {
        "true" | "True" => Token::Literal(JsonValue::Bool(true)),
        "false" | "False" => Token::Literal(JsonValue::Bool(false)),
        "null" | "None" | "undefined" => Token::Literal(JsonValue::Null),
        "and" | "AND" => Token::And,
        "or" | "OR" => Token::Or,
        "not" | "NOT" => Token::Not,
        other => Token::Literal(JsonValue::String(other.to_string())),
    };
    (token, end)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Condition, ConditionError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Condition, ConditionError> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Condition, ConditionError> {
        if self.eat(&Token::Not) {
            return Ok(Condition::Not(Box::new(self.parse_not()?)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Condition, ConditionError> {
        let left = self.parse_primary()?;
        if let Some(Token::Cmp(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.parse_primary()?;
            return Ok(Condition::Compare(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Condition, ConditionError> {
        let token = self.tokens.get(self.pos).cloned().ok_or(ConditionError::UnexpectedEnd)?;
        self.pos += 1;
        match token {
            Token::LParen => {
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return Err(match self.peek() {
                        Some(t) => ConditionError::UnexpectedToken(format!("{t:?}")),
                        None => ConditionError::UnexpectedEnd,
                    });
                }
                Ok(inner)
            }
            Token::Literal(v) => Ok(Condition::Literal(v)),
            Token::Expr(e) => Ok(Condition::Expr(e)),
            other => Err(ConditionError::UnexpectedToken(format!("{other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolver(expr: &str) -> JsonValue {
        match expr {
            "$statusCode" => json!(200),
            "$response.body#/status" => json!("active"),
            "$response.body.count" => json!("3"),
            "$inputs.items" => json!([1, 2]),
            "$steps.s['odd key'].flag" => json!(true),
            _ => JsonValue::Null,
        }
    }

    fn eval(cond: &str) -> bool {
        evaluate_condition(cond, &resolver).unwrap()
    }

    #[test]
    fn comparisons_and_logic() {
        assert!(eval("$statusCode == 200"));
        assert!(eval("$statusCode >= 200 && $statusCode < 300"));
        assert!(!eval("$statusCode == 201 || $statusCode > 299"));
        assert!(eval("$response.body#/status == 'active'"));
        assert!(eval("!($statusCode != 200)"));
        assert!(eval("$statusCode == 200 and not $missing"));
    }

    #[test]
    fn loose_numeric_coercion() {
        assert!(eval("$response.body.count == 3"));
        assert!(eval("$response.body.count > 2"));
        assert!(eval("$statusCode == '200'"));
    }

    #[test]
    fn literals_and_truthiness() {
        assert!(eval("$missing == null"));
        assert!(eval("$inputs.items == [1, 2]"));
        assert!(eval("$steps.s['odd key'].flag"));
        assert!(!eval("false"));
        assert!(eval("-1 < 0"));
    }

    #[test]
    fn rejects_malformed_conditions() {
        assert_eq!(parse_condition("   "), Err(ConditionError::Empty));
        assert!(parse_condition("($statusCode == 200").is_err());
        assert!(parse_condition("'open").is_err());
        assert!(parse_condition("$a == == 1").is_err());
    }
}
