use crate::feeder::DataRow;
use crate::variable::functions::FunctionRegistry;
use crate::variable::resolver::TemplateResolver;
use crate::{Result, RuloadError};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 提取失败时写入变量的默认哨兵值
pub const NOT_FOUND: &str = "NOT_FOUND";

/// 变量值
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
    /// 数组或对象，保留原始 JSON 结构
    Json(serde_json::Value),
}

impl Value {
    /// 从 JSON 值转换，标量映射到对应类型，数组/对象保留为 Json
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => Value::Number(f),
                None => Value::String(n.to_string()),
            },
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Null => Value::Null,
            other => Value::Json(other.clone()),
        }
    }

    /// 宽松相等：同类型按值比较，数字与字符串按渲染后的文本比较
    pub fn loosely_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => (a - b).abs() < f64::EPSILON,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::Null, _) | (_, Value::Null) => false,
            (a, b) => a.to_string() == b.to_string(),
        }
    }

    /// 作为条件使用时的真值
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty() && s != "false" && s != "0",
            Value::Null => false,
            Value::Json(_) => true,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Bool(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// 全局只读变量（场景 `variables` + 环境覆盖），所有虚拟用户共享
#[derive(Debug, Clone, Default)]
pub struct Globals {
    variables: HashMap<String, Value>,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    pub fn extend(&mut self, vars: impl IntoIterator<Item = (String, Value)>) {
        self.variables.extend(vars);
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// 单次迭代的变量作用域
///
/// 两层结构：只读的全局层 + 迭代内的本地层。本地层在迭代开始时创建、
/// 结束时丢弃，因此提取出的变量不会泄漏到下一次迭代。
#[derive(Debug, Clone)]
pub struct VariableStore {
    globals: Arc<Globals>,
    locals: HashMap<String, Value>,
    functions: Arc<FunctionRegistry>,
}

impl VariableStore {
    pub fn new(globals: Arc<Globals>, functions: Arc<FunctionRegistry>) -> Self {
        Self {
            globals,
            locals: HashMap::new(),
            functions,
        }
    }

    /// 写入迭代变量，同名变量后写覆盖先写
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.locals.insert(name.into(), value.into());
    }

    /// 读取变量，本地层优先
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.lookup(name)
            .ok_or_else(|| RuloadError::UnresolvedVariable(name.to_string()))
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.locals.get(name).or_else(|| self.globals.get(name))
    }

    /// 把数据源的一行合并进本地层
    pub fn merge_row(&mut self, row: &DataRow) {
        for (key, value) in row.iter() {
            self.locals
                .insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    /// 渲染模板中的所有 `${...}` 占位符
    pub fn render(&self, template: &str) -> Result<String> {
        TemplateResolver::render(template, self)
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// 本地层变量数量
    pub fn local_len(&self) -> usize {
        self.locals.len()
    }
}
