use crate::assertion::AssertionRule;
use crate::extract::Extraction;
use crate::feeder::FeederSet;
use crate::http::{DEFAULT_TIMEOUT, Method, ThinkTime};
use crate::scenario::expr::Guard;
use crate::variable::{FunctionRegistry, Globals, VariableStore};
use crate::{Result, RuloadError};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// 加载后不可变的场景
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,

    /// 相对 URL 的基地址
    pub default_address: Option<url::Url>,

    /// 应用到每个请求的默认 Header
    pub headers: Vec<(String, String)>,

    pub globals: Arc<Globals>,

    pub functions: Arc<FunctionRegistry>,

    pub steps: Vec<Step>,

    pub think_time: ThinkTime,

    pub timeout: Duration,

    pub failure_policy: FailurePolicy,

    pub feeders: FeederSet,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_address: None,
            headers: Vec::new(),
            globals: Arc::new(Globals::new()),
            functions: Arc::new(FunctionRegistry::builtin()),
            steps: Vec::new(),
            think_time: ThinkTime::none(),
            timeout: DEFAULT_TIMEOUT,
            failure_policy: FailurePolicy::default(),
            feeders: FeederSet::default(),
        }
    }

    /// 新迭代的变量作用域
    pub fn new_store(&self) -> VariableStore {
        VariableStore::new(self.globals.clone(), self.functions.clone())
    }

    /// 所有请求步骤（含嵌套），按声明顺序
    pub fn requests(&self) -> Vec<&RequestStep> {
        let mut out = Vec::new();
        collect_requests(&self.steps, &mut out);
        out
    }
}

fn collect_requests<'a>(steps: &'a [Step], out: &mut Vec<&'a RequestStep>) {
    for step in steps {
        match step {
            Step::Request(request) => out.push(request),
            Step::Control(control) => {
                collect_requests(&control.then, out);
                collect_requests(&control.otherwise, out);
            }
            Step::Action(_) => {}
        }
    }
}

/// 场景步骤
#[derive(Debug, Clone)]
pub enum Step {
    Request(Box<RequestStep>),
    Control(ControlStep),
    Action(Action),
}

/// 请求步骤
#[derive(Debug, Clone)]
pub struct RequestStep {
    /// 在场景中的序号（从 1 开始，嵌套步骤按出现顺序编号）
    pub position: usize,

    pub label: String,

    pub method: Method,

    /// URL 模板
    pub url: String,

    pub params: Vec<(String, String)>,

    pub headers: Vec<(String, String)>,

    /// Body 模板
    pub body: Option<String>,

    /// Body 来自结构化配置，发送时默认 `Content-Type: application/json`
    pub json_body: bool,

    /// 覆盖场景的 think-time
    pub think_time: Option<ThinkTime>,

    /// 覆盖场景的超时
    pub timeout: Option<Duration>,

    pub assertions: Vec<AssertionRule>,

    pub extractions: Vec<Extraction>,
}

impl RequestStep {
    pub fn new(position: usize, method: Method, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            position,
            label: url.clone(),
            method,
            url,
            params: Vec::new(),
            headers: Vec::new(),
            body: None,
            json_body: false,
            think_time: None,
            timeout: None,
            assertions: Vec::new(),
            extractions: Vec::new(),
        }
    }
}

/// 条件步骤：守卫为真执行 `then`，否则执行 `otherwise`
#[derive(Debug, Clone)]
pub struct ControlStep {
    pub guard: Guard,
    pub then: Vec<Step>,
    pub otherwise: Vec<Step>,
}

/// 迭代控制动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// 跳过本次迭代剩余步骤
    Continue,
    /// 当前虚拟用户停止
    Break,
    /// 整个运行停止
    Stop,
}

impl FromStr for Action {
    type Err = RuloadError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "continue" => Ok(Action::Continue),
            "break" => Ok(Action::Break),
            "stop" => Ok(Action::Stop),
            other => Err(RuloadError::Config(format!(
                "Invalid action: {}. Must be 'continue', 'break' or 'stop'",
                other
            ))),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Continue => write!(f, "continue"),
            Action::Break => write!(f, "break"),
            Action::Stop => write!(f, "stop"),
        }
    }
}

/// 请求未完成时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// 记录失败，继续下一步
    #[default]
    Continue,
    /// 放弃本次迭代
    AbortIteration,
    /// 当前虚拟用户停止
    StopUser,
}

impl FailurePolicy {
    pub fn parse(s: &str) -> Result<Self> {
        s.parse()
    }
}

impl FromStr for FailurePolicy {
    type Err = RuloadError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "continue" => Ok(FailurePolicy::Continue),
            "abort-iteration" => Ok(FailurePolicy::AbortIteration),
            "stop-user" => Ok(FailurePolicy::StopUser),
            other => Err(RuloadError::Config(format!(
                "Invalid on-failure policy: {}. Must be 'continue', 'abort-iteration' or 'stop-user'",
                other
            ))),
        }
    }
}
