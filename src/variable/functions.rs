use crate::{Result, RuloadError};
use chrono::format::{Item, StrftimeItems};
use rand::Rng;
use rand::distr::Alphanumeric;
use std::collections::HashMap;
use std::fmt;

/// 表达式函数签名：参数已按逗号拆分并去除首尾空白
pub type ExpressionFn = fn(&[String]) -> Result<String>;

/// 模板中可调用的表达式函数注册表
///
/// 只允许显式注册的纯函数，没有通用脚本解释器。
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, ExpressionFn>,
}

impl FunctionRegistry {
    /// 空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置函数：`__Random`、`__RandomString`、`__UUID`、`__time`
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("__Random", random);
        registry.register("__RandomString", random_string);
        registry.register("__UUID", uuid);
        registry.register("__time", time);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, function: ExpressionFn) {
        self.functions.insert(name.into(), function);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn call(&self, name: &str, args: &[String]) -> Result<String> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| RuloadError::UnknownExpressionFunction(name.to_string()))?;
        function(args)
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

fn arity_error(name: &str, expected: &str, got: usize) -> RuloadError {
    RuloadError::TemplateRender(format!(
        "{} 需要 {} 个参数，实际 {} 个",
        name, expected, got
    ))
}

fn parse_int(name: &str, raw: &str) -> Result<i64> {
    raw.parse::<i64>().map_err(|_| {
        RuloadError::TemplateRender(format!("{} 的参数不是整数: {}", name, raw))
    })
}

/// `${__Random(min, max)}`，闭区间内的随机整数
fn random(args: &[String]) -> Result<String> {
    if args.len() != 2 {
        return Err(arity_error("__Random", "2", args.len()));
    }
    let min = parse_int("__Random", &args[0])?;
    let max = parse_int("__Random", &args[1])?;
    if min > max {
        return Err(RuloadError::TemplateRender(format!(
            "__Random 的下界 {} 大于上界 {}",
            min, max
        )));
    }

    Ok(rand::rng().random_range(min..=max).to_string())
}

/// `${__RandomString(length[, chars])}`，默认使用字母数字
fn random_string(args: &[String]) -> Result<String> {
    if args.is_empty() || args.len() > 2 {
        return Err(arity_error("__RandomString", "1-2", args.len()));
    }
    let length = parse_int("__RandomString", &args[0])?.max(0) as usize;
    let mut rng = rand::rng();

    match args.get(1).filter(|chars| !chars.is_empty()) {
        Some(chars) => {
            let pool: Vec<char> = chars.chars().collect();
            Ok((0..length)
                .map(|_| pool[rng.random_range(0..pool.len())])
                .collect())
        }
        None => Ok((0..length)
            .map(|_| rng.sample(Alphanumeric) as char)
            .collect()),
    }
}

/// `${__UUID()}`
fn uuid(args: &[String]) -> Result<String> {
    if !args.is_empty() {
        return Err(arity_error("__UUID", "0", args.len()));
    }
    Ok(uuid::Uuid::new_v4().to_string())
}

/// `${__time()}` 毫秒时间戳，`${__time(%Y-%m-%d)}` 按 chrono 格式输出
fn time(args: &[String]) -> Result<String> {
    let now = chrono::Utc::now();
    match args {
        [] => Ok(now.timestamp_millis().to_string()),
        [format] if format.is_empty() => Ok(now.timestamp_millis().to_string()),
        [format] => {
            let items: Vec<Item> = StrftimeItems::new(format).collect();
            if items.iter().any(|item| matches!(item, Item::Error)) {
                return Err(RuloadError::TemplateRender(format!(
                    "__time 的格式无效: {}",
                    format
                )));
            }
            Ok(now.format_with_items(items.into_iter()).to_string())
        }
        _ => Err(arity_error("__time", "0-1", args.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_random_in_range() {
        let registry = FunctionRegistry::builtin();
        for _ in 0..50 {
            let value: i64 = registry
                .call("__Random", &args(&["1", "3"]))
                .unwrap()
                .parse()
                .unwrap();
            assert!((1..=3).contains(&value));
        }
    }

    #[test]
    fn test_random_bad_arguments() {
        let registry = FunctionRegistry::builtin();
        assert!(matches!(
            registry.call("__Random", &args(&["1"])),
            Err(RuloadError::TemplateRender(_))
        ));
        assert!(matches!(
            registry.call("__Random", &args(&["a", "3"])),
            Err(RuloadError::TemplateRender(_))
        ));
        assert!(matches!(
            registry.call("__Random", &args(&["9", "3"])),
            Err(RuloadError::TemplateRender(_))
        ));
    }

    #[test]
    fn test_random_string() {
        let registry = FunctionRegistry::builtin();
        let value = registry.call("__RandomString", &args(&["8"])).unwrap();
        assert_eq!(value.len(), 8);
        assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));

        let value = registry.call("__RandomString", &args(&["5", "x"])).unwrap();
        assert_eq!(value, "xxxxx");
    }

    #[test]
    fn test_uuid() {
        let registry = FunctionRegistry::builtin();
        let value = registry.call("__UUID", &[]).unwrap();
        assert!(uuid::Uuid::parse_str(&value).is_ok());
    }

    #[test]
    fn test_time() {
        let registry = FunctionRegistry::builtin();
        let millis: i64 = registry.call("__time", &[]).unwrap().parse().unwrap();
        assert!(millis > 0);

        let year = registry.call("__time", &args(&["%Y"])).unwrap();
        assert_eq!(year.len(), 4);
    }

    #[test]
    fn test_unknown_function() {
        let registry = FunctionRegistry::builtin();
        let err = registry.call("__javaScript", &[]).unwrap_err();
        assert!(matches!(err, RuloadError::UnknownExpressionFunction(_)));
    }

    #[test]
    fn test_register_custom() {
        fn constant(_: &[String]) -> Result<String> {
            Ok("fixed".to_string())
        }

        let mut registry = FunctionRegistry::new();
        assert!(!registry.contains("__constant"));
        registry.register("__constant", constant);
        assert_eq!(registry.call("__constant", &[]).unwrap(), "fixed");
    }
}
