pub mod config;
pub mod functions;
pub mod resolver;
pub mod types;

pub use config::{EnvironmentConfig, EnvironmentLoader};
pub use functions::{ExpressionFn, FunctionRegistry};
pub use resolver::TemplateResolver;
pub use types::{Globals, NOT_FOUND, Value, VariableStore};
