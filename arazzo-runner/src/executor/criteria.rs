use std::sync::LazyLock;

use arazzo_core::expressions::JsonPointer;
use arazzo_core::types::{Criterion, KnownCriterionType};
use regex::Regex;
use serde_json::Value as JsonValue;
use serde_json_path::JsonPath;

use crate::executor::response::OperationResponse;
use crate::expression::{compare, CmpOp, ConditionError, ExpressionEvaluator};

static BODY_POINTER_CMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\$response\.body#(\S*)\s*(===|!==|==|!=|<=|>=|<|>)\s*(.+?)\s*$").expect("valid regex")
});

static COUNT_CMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*count\(\s*@\.([A-Za-z0-9_\-.]+)\s*\)\s*(==|!=|<=|>=|<|>)\s*(-?[0-9]+(?:\.[0-9]+)?)\s*$")
        .expect("valid regex")
});

static PATH_CMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\$[^=!<>]*?)\s*(==|!=|<=|>=|<|>)\s*(.+?)\s*$").expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CriteriaError {
    #[error("{0} criteria are not supported")]
    Unsupported(&'static str),
    #[error("invalid regex '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },
    #[error("invalid JSONPath '{path}': {message}")]
    InvalidJsonPath { path: String, message: String },
    #[error("invalid condition: {0}")]
    Condition(#[from] ConditionError),
}

/// Checks a step's success criteria against one response.
pub struct SuccessCriteriaChecker<'a> {
    evaluator: ExpressionEvaluator<'a>,
    response: Option<&'a OperationResponse>,
}

impl<'a> SuccessCriteriaChecker<'a> {
    /// `evaluator` must carry the response's evaluation context.
    pub fn new(evaluator: ExpressionEvaluator<'a>, response: &'a OperationResponse) -> Self {
        Self {
            evaluator,
            response: Some(response),
        }
    }

    /// A checker for steps that produce no HTTP response (nested workflow
    /// steps). Conditions see only the execution state.
    pub fn without_response(evaluator: ExpressionEvaluator<'a>) -> Self {
        Self {
            evaluator,
            response: None,
        }
    }

    /// No criteria means any 2xx status. Otherwise every criterion must hold;
    /// a criterion that cannot be evaluated counts as failed.
    pub fn check(&self, criteria: &[Criterion]) -> bool {
        if criteria.is_empty() {
            return self.response.is_some_and(OperationResponse::is_success);
        }
        criteria.iter().all(|c| match self.evaluate_criterion(c) {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!(condition = %c.condition, error = %e, "criterion could not be evaluated");
                false
            }
        })
    }

    pub fn evaluate_criterion(&self, c: &Criterion) -> Result<bool, CriteriaError> {
        match c.kind() {
            KnownCriterionType::Simple => self.evaluate_simple(c),
            KnownCriterionType::Regex => self.evaluate_regex(c),
            KnownCriterionType::Jsonpath => self.evaluate_jsonpath(c),
            KnownCriterionType::Xpath => Err(CriteriaError::Unsupported("xpath")),
        }
    }

    fn evaluate_simple(&self, c: &Criterion) -> Result<bool, CriteriaError> {
        let fast_path = self.response.and_then(|r| BODY_POINTER_CMP.captures(&c.condition).map(|caps| (r, caps)));
        if let Some((response, caps)) = fast_path.filter(|(_, caps)| is_single_literal(&caps[3])) {
            if let (Ok(ptr), Some(op)) = (JsonPointer::parse(&caps[1]), CmpOp::parse(&caps[2])) {
                let actual = ptr.resolve(&response.body).cloned().unwrap_or(JsonValue::Null);
                return Ok(compare(op, &actual, &parse_literal(&caps[3])));
            }
        }
        Ok(self.evaluator.evaluate_condition(&c.condition)?)
    }

    fn context_value(&self, c: &Criterion) -> JsonValue {
        match c.context.as_deref() {
            Some(ctx) => self.evaluator.evaluate(ctx),
            None => self.response.map(|r| r.body.clone()).unwrap_or(JsonValue::Null),
        }
    }

    fn evaluate_regex(&self, c: &Criterion) -> Result<bool, CriteriaError> {
        let context = match self.context_value(c) {
            JsonValue::String(s) => s,
            JsonValue::Null => String::new(),
            v => v.to_string(),
        };
        let pattern = c.condition.trim();
        let re = Regex::new(pattern).map_err(|e| CriteriaError::InvalidRegex {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(re.is_match(&context))
    }

    fn evaluate_jsonpath(&self, c: &Criterion) -> Result<bool, CriteriaError> {
        let context = self.context_value(c);
        if context.is_null() {
            return Ok(false);
        }
        let condition = c.condition.trim();

        if let Some(caps) = COUNT_CMP.captures(condition) {
            let count = count_field(&context, &caps[1]);
            let expected = parse_literal(&caps[3]);
            let op = CmpOp::parse(&caps[2]).unwrap_or(CmpOp::Eq);
            return Ok(compare(op, &JsonValue::from(count), &expected));
        }

        // Filters need an array to select from.
        let target = if condition.contains("[?") && !context.is_array() {
            JsonValue::Array(vec![context])
        } else {
            context
        };

        if !condition.starts_with("$[?") {
            if let Some(caps) = PATH_CMP.captures(condition) {
                let path = parse_jsonpath(&caps[1])?;
                let nodes = path.query(&target).all();
                let Some(actual) = nodes.first() else {
                    return Ok(false);
                };
                let op = CmpOp::parse(&caps[2]).unwrap_or(CmpOp::Eq);
                return Ok(compare(op, actual, &parse_literal(&caps[3])));
            }
        }

        let path = parse_jsonpath(condition)?;
        Ok(!path.query(&target).all().is_empty())
    }
}

fn parse_jsonpath(path: &str) -> Result<JsonPath, CriteriaError> {
    JsonPath::parse(path.trim()).map_err(|e| CriteriaError::InvalidJsonPath {
        path: path.to_string(),
        message: e.to_string(),
    })
}

/// Number of values at a dotted field path: an array counts its items, any
/// other present value counts once.
fn count_field(context: &JsonValue, field: &str) -> usize {
    let mut cur = context;
    for part in field.split('.').filter(|p| !p.is_empty()) {
        match cur.get(part) {
            Some(v) => cur = v,
            None => return 0,
        }
    }
    match cur {
        JsonValue::Array(items) => items.len(),
        JsonValue::Null => 0,
        _ => 1,
    }
}

pub(crate) fn parse_literal(s: &str) -> JsonValue {
    let s = s.trim();

    if let Ok(v) = serde_json::from_str::<JsonValue>(s) {
        return v;
    }
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        return JsonValue::String(s[1..s.len() - 1].to_string());
    }
    match s {
        "True" => return JsonValue::Bool(true),
        "False" => return JsonValue::Bool(false),
        "None" | "undefined" => return JsonValue::Null,
        _ => {}
    }
    JsonValue::String(s.to_string())
}

/// A quoted string, or one bare token with no expression or operator in it.
fn is_single_literal(s: &str) -> bool {
    let s = s.trim();
    for quote in ['\'', '"'] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|r| r.strip_suffix(quote)) {
            return !inner.contains(quote);
        }
    }
    !s.is_empty()
        && !s
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '$' | '&' | '|' | '=' | '<' | '>' | '!' | '(' | ')' | '\'' | '"'))
}
