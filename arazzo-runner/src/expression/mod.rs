//! Runtime expression and condition evaluation over execution state.

mod condition;
mod evaluator;

pub use condition::{
    compare, evaluate_condition, parse_condition, truthy, CmpOp, Condition, ConditionError,
};
pub use evaluator::{stringify, ExpressionEvaluator};
