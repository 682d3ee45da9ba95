use crate::http::ThinkTime;
use crate::{Result, RuloadError};
use serde::Deserialize;
use std::time::Duration;

/// 配置中的时长：整数/小数秒，或 `30s`、`1m 30s`、`250ms` 这样的字符串
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(f64),
    Text(String),
}

impl DurationValue {
    pub fn to_duration(&self) -> Result<Duration> {
        match self {
            DurationValue::Seconds(secs) => seconds(*secs),
            DurationValue::Text(text) => parse_duration(text),
        }
    }
}

fn seconds(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| RuloadError::Config(format!("Invalid duration: {}", secs)))
}

/// 解析时长字符串，纯数字按秒处理
pub fn parse_duration(text: &str) -> Result<Duration> {
    let trimmed = text.trim();
    if let Ok(secs) = trimmed.parse::<f64>() {
        return seconds(secs);
    }
    humantime::parse_duration(trimmed)
        .map_err(|e| RuloadError::Config(format!("Invalid duration '{}': {}", trimmed, e)))
}

/// think-time 配置
///
/// * `2s`：固定延迟
/// * `uniform(1s, 3s)`：区间内均匀分布
/// * `{min: 1s, max: 3s}`：同上
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ThinkTimeConfig {
    Range {
        min: DurationValue,
        max: DurationValue,
    },
    Simple(DurationValue),
}

impl ThinkTimeConfig {
    pub fn to_think_time(&self) -> Result<ThinkTime> {
        match self {
            ThinkTimeConfig::Range { min, max } => {
                Ok(ThinkTime::uniform(min.to_duration()?, max.to_duration()?))
            }
            ThinkTimeConfig::Simple(DurationValue::Text(text)) => parse_think_time(text),
            ThinkTimeConfig::Simple(value) => Ok(ThinkTime::constant(value.to_duration()?)),
        }
    }
}

/// 解析 think-time 字符串
pub fn parse_think_time(text: &str) -> Result<ThinkTime> {
    let trimmed = text.trim();
    let Some(inner) = trimmed
        .strip_prefix("uniform(")
        .and_then(|rest| rest.strip_suffix(')'))
    else {
        return Ok(ThinkTime::constant(parse_duration(trimmed)?));
    };

    let (min, max) = inner.split_once(',').ok_or_else(|| {
        RuloadError::Config(format!(
            "Invalid think-time '{}': expected uniform(min, max)",
            trimmed
        ))
    })?;
    Ok(ThinkTime::uniform(parse_duration(min)?, parse_duration(max)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1.5").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1m 30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("-1").is_err());
    }

    #[test]
    fn test_duration_value_from_yaml() {
        let value: DurationValue = serde_yaml::from_str("60").unwrap();
        assert_eq!(value.to_duration().unwrap(), Duration::from_secs(60));

        let value: DurationValue = serde_yaml::from_str("2m").unwrap();
        assert_eq!(value.to_duration().unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn test_think_time_forms() {
        let zero: ThinkTimeConfig = serde_yaml::from_str("0").unwrap();
        assert!(zero.to_think_time().unwrap().is_none());

        let constant: ThinkTimeConfig = serde_yaml::from_str("500ms").unwrap();
        assert_eq!(
            constant.to_think_time().unwrap(),
            ThinkTime::constant(Duration::from_millis(500))
        );

        let uniform: ThinkTimeConfig = serde_yaml::from_str("uniform(1s, 3s)").unwrap();
        assert_eq!(
            uniform.to_think_time().unwrap(),
            ThinkTime::uniform(Duration::from_secs(1), Duration::from_secs(3))
        );

        let range: ThinkTimeConfig = serde_yaml::from_str("{min: 0s, max: 2s}").unwrap();
        assert_eq!(
            range.to_think_time().unwrap(),
            ThinkTime::uniform(Duration::ZERO, Duration::from_secs(2))
        );
    }

    #[test]
    fn test_think_time_invalid() {
        assert!(parse_think_time("uniform(1s)").is_err());
        assert!(parse_think_time("uniform(1s, later)").is_err());
    }
}
