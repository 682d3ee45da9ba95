use crate::extract::jsonpath::JsonPath;
use crate::variable::{NOT_FOUND, Value};
use crate::{Result, RuloadError};
use regex::Regex;

/// 多个匹配时选哪一个
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchNo {
    /// 单个匹配取标量，多个匹配取数组
    #[default]
    Auto,
    /// 第 n 个匹配（从 1 开始）
    Nth(usize),
    /// 随机一个匹配
    Random,
    /// 全部匹配组成数组
    All,
}

impl MatchNo {
    /// `match-no` 配置值：-1 全部，0 随机，n 第 n 个
    pub fn from_config(value: Option<i64>) -> Result<Self> {
        match value {
            None => Ok(MatchNo::Auto),
            Some(-1) => Ok(MatchNo::All),
            Some(0) => Ok(MatchNo::Random),
            Some(n) if n > 0 => Ok(MatchNo::Nth(n as usize)),
            Some(n) => Err(RuloadError::Config(format!("Invalid match-no: {}", n))),
        }
    }
}

/// 正则提取的作用对象
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegexSubject {
    #[default]
    Body,
    Headers,
}

/// 提取来源
#[derive(Debug, Clone)]
pub enum ExtractSource {
    /// 对响应 Body 执行 JSON path
    JsonPath(JsonPath),
    /// 正则表达式，取指定分组
    Regex {
        pattern: Regex,
        group: usize,
        subject: RegexSubject,
    },
}

/// 一条变量提取规则
///
/// 无论是否匹配都会写入变量：未匹配时写入默认值（缺省为 `NOT_FOUND`）。
#[derive(Debug, Clone)]
pub struct Extraction {
    /// 目标变量名
    pub name: String,
    pub source: ExtractSource,
    pub default: Value,
    pub match_no: MatchNo,
}

impl Extraction {
    pub fn jsonpath(name: impl Into<String>, path: &str) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            source: ExtractSource::JsonPath(JsonPath::parse(path)?),
            default: Value::from(NOT_FOUND),
            match_no: MatchNo::Auto,
        })
    }

    /// `template` 形如 `$1$`，表示取第 1 个分组
    pub fn regex(
        name: impl Into<String>,
        pattern: &str,
        template: &str,
        subject: RegexSubject,
    ) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| RuloadError::Config(format!("Invalid regexp '{}': {}", pattern, e)))?;
        let group = parse_template(template)?;
        if group >= pattern.captures_len() {
            return Err(RuloadError::Config(format!(
                "Regexp '{}' has no group {}",
                pattern, group
            )));
        }

        Ok(Self {
            name: name.into(),
            source: ExtractSource::Regex {
                pattern,
                group,
                subject,
            },
            default: Value::from(NOT_FOUND),
            match_no: MatchNo::Auto,
        })
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    pub fn with_match_no(mut self, match_no: MatchNo) -> Self {
        self.match_no = match_no;
        self
    }
}

fn parse_template(template: &str) -> Result<usize> {
    let trimmed = template.trim();
    let inner = trimmed
        .strip_prefix('$')
        .and_then(|s| s.strip_suffix('$'))
        .unwrap_or(trimmed);
    inner
        .parse::<usize>()
        .map_err(|_| RuloadError::Config(format!("Invalid regexp template: {}", template)))
}
