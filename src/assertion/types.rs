use crate::extract::JsonPath;
use crate::variable::Value;
use crate::{Result, RuloadError};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// 断言作用对象
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Subject {
    /// 响应 Body
    #[default]
    Body,
    /// HTTP 状态码
    HttpCode,
    /// 全部响应 Header（`name: value` 行）
    Headers,
}

impl FromStr for Subject {
    type Err = RuloadError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "body" => Ok(Subject::Body),
            "http-code" | "status" => Ok(Subject::HttpCode),
            "headers" => Ok(Subject::Headers),
            other => Err(RuloadError::Config(format!(
                "Invalid assertion subject: {}. Must be 'body', 'http-code' or 'headers'",
                other
            ))),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Body => write!(f, "body"),
            Subject::HttpCode => write!(f, "http-code"),
            Subject::Headers => write!(f, "headers"),
        }
    }
}

/// 断言中的单个期望值
#[derive(Debug, Clone)]
pub enum Pattern {
    Literal(String),
    Regex(Regex),
}

impl Pattern {
    pub fn as_str(&self) -> &str {
        match self {
            Pattern::Literal(s) => s,
            Pattern::Regex(re) => re.as_str(),
        }
    }
}

/// `contains` 断言：主体值与一组期望值比对，可用 `not` 取反
#[derive(Debug, Clone)]
pub struct ContainsRule {
    pub patterns: Vec<Pattern>,
    pub subject: Subject,
    pub negate: bool,
}

/// `assert-jsonpath` 断言
#[derive(Debug, Clone)]
pub struct JsonPathRule {
    pub path: JsonPath,
    /// 期望值，仅在 `validate` 时比较
    pub expected: Option<Value>,
    pub validate: bool,
    pub invert: bool,
}

/// 断言规则
#[derive(Debug, Clone)]
pub enum AssertionRule {
    Contains(ContainsRule),
    JsonPath(JsonPathRule),
}

impl AssertionRule {
    /// 构造 `contains` 断言
    ///
    /// `regexp` 为真时期望值按正则处理：状态码要求完全匹配，Body/Header 要求能找到。
    pub fn contains(
        values: Vec<String>,
        subject: Subject,
        negate: bool,
        regexp: bool,
    ) -> Result<Self> {
        if values.is_empty() {
            return Err(RuloadError::Config(
                "Assertion 'contains' needs at least one value".to_string(),
            ));
        }

        let patterns = values
            .into_iter()
            .map(|value| {
                if !regexp {
                    return Ok(Pattern::Literal(value));
                }
                let source = match subject {
                    Subject::HttpCode => format!("^(?:{})$", value),
                    Subject::Body | Subject::Headers => value.clone(),
                };
                Regex::new(&source).map(Pattern::Regex).map_err(|e| {
                    RuloadError::Config(format!("Invalid assertion regexp '{}': {}", value, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(AssertionRule::Contains(ContainsRule {
            patterns,
            subject,
            negate,
        }))
    }

    /// 构造 `assert-jsonpath` 断言
    pub fn jsonpath(
        path: &str,
        expected: Option<Value>,
        validate: bool,
        invert: bool,
    ) -> Result<Self> {
        Ok(AssertionRule::JsonPath(JsonPathRule {
            path: JsonPath::parse(path)?,
            expected,
            validate,
            invert,
        }))
    }

    /// 用于报告的可读描述
    pub fn describe(&self) -> String {
        match self {
            AssertionRule::Contains(rule) => {
                let values: Vec<&str> = rule.patterns.iter().map(|p| p.as_str()).collect();
                format!(
                    "{}{} contains [{}]",
                    if rule.negate { "not " } else { "" },
                    rule.subject,
                    values.join(", ")
                )
            }
            AssertionRule::JsonPath(rule) => {
                let mut text = format!("jsonpath {}", rule.path);
                if rule.validate {
                    if let Some(expected) = &rule.expected {
                        text.push_str(&format!(" == {}", expected));
                    }
                }
                if rule.invert {
                    text = format!("not {}", text);
                }
                text
            }
        }
    }
}

impl fmt::Display for AssertionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// 断言判定
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail(String),
}

/// 断言结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionOutcome {
    /// 断言描述
    pub rule: String,

    #[serde(flatten)]
    pub verdict: Verdict,
}

impl AssertionOutcome {
    /// 创建成功的断言结果
    pub fn pass(rule: String) -> Self {
        Self {
            rule,
            verdict: Verdict::Pass,
        }
    }

    /// 创建失败的断言结果
    pub fn fail(rule: String, reason: impl Into<String>) -> Self {
        Self {
            rule,
            verdict: Verdict::Fail(reason.into()),
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    pub fn reason(&self) -> Option<&str> {
        match &self.verdict {
            Verdict::Pass => None,
            Verdict::Fail(reason) => Some(reason),
        }
    }
}
