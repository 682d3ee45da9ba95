/// 场景模型 - 步骤、守卫表达式以及从配置的转换
pub mod converter;
pub mod expr;
pub mod types;

pub use converter::convert_scenario;
pub use expr::{CmpOp, Expr, Guard};
pub use types::{Action, ControlStep, FailurePolicy, RequestStep, Scenario, Step};
