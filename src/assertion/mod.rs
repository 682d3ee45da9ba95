/// 断言模块 - 对执行结果求值通过/失败
mod evaluator;
mod types;

pub use evaluator::{evaluate_all, evaluate_assertion};
pub use types::{
    AssertionOutcome, AssertionRule, ContainsRule, JsonPathRule, Pattern, Subject, Verdict,
};
