mod json_pointer;
mod runtime;
mod template;

pub use json_pointer::{decode_token, escape_token, JsonPointer, JsonPointerError};
pub use runtime::{parse_runtime_expr, ExprRoot, PathSegment, RuntimeExpr, RuntimeExprError};
pub use template::{parse_template, Segment, Template, TemplateError};

/// True when `s` is a whole runtime expression (leading `$` after trimming).
pub fn is_runtime_expr(s: &str) -> bool {
    s.trim_start().starts_with('$')
}
