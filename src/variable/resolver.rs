use crate::variable::types::VariableStore;
use crate::Result;
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// 模板渲染器
///
/// 支持两种占位符：
/// - `${name}` 变量引用
/// - `${__fn(arg1, arg2)}` 已注册的表达式函数调用
pub struct TemplateResolver;

impl TemplateResolver {
    fn placeholder_regex() -> &'static Regex {
        static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
        PLACEHOLDER.get_or_init(|| {
            Regex::new(
                r"\$\{(?:(__[A-Za-z_][A-Za-z0-9_]*)\((.*?)\)|([A-Za-z_][A-Za-z0-9_.\-]*))\}",
            )
            .expect("placeholder regex is valid")
        })
    }

    /// 一次性从左到右替换所有占位符
    ///
    /// 替换结果不会被再次扫描：变量值里出现的 `${...}` 原样保留。
    /// 无法识别的 `${...}` 写法同样原样保留。
    pub fn render(template: &str, store: &VariableStore) -> Result<String> {
        let re = Self::placeholder_regex();
        let mut output = String::with_capacity(template.len());
        let mut last = 0;

        for caps in re.captures_iter(template) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            output.push_str(&template[last..whole.start()]);
            output.push_str(&Self::expand(&caps, store)?);
            last = whole.end();
        }
        output.push_str(&template[last..]);

        Ok(output)
    }

    fn expand(caps: &Captures, store: &VariableStore) -> Result<String> {
        if let Some(function) = caps.get(1) {
            let raw_args = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let args = split_args(raw_args);
            return store.functions().call(function.as_str(), &args);
        }

        let name = &caps[3];
        store.get(name).map(|value| value.to_string())
    }

    /// 模板中是否还有可识别的占位符
    pub fn has_placeholders(text: &str) -> bool {
        Self::placeholder_regex().is_match(text)
    }

    /// 模板引用到的变量名（不含函数调用），按出现顺序
    pub fn referenced_variables(template: &str) -> Vec<String> {
        Self::placeholder_regex()
            .captures_iter(template)
            .filter_map(|caps| caps.get(3).map(|m| m.as_str().to_string()))
            .collect()
    }

    /// 解析并替换系统环境变量 ${VAR}
    pub fn resolve_env_vars(text: &str) -> String {
        static ENV_REGEX: OnceLock<Regex> = OnceLock::new();
        let re = ENV_REGEX
            .get_or_init(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env regex is valid"));

        re.replace_all(text, |caps: &Captures| {
            let env_name = &caps[1];
            std::env::var(env_name).unwrap_or_else(|_| caps[0].to_string())
        })
        .to_string()
    }
}

/// 按逗号拆分函数参数，`\,` 表示字面量逗号
fn split_args(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    let mut args = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                current.push(',');
                chars.next();
            }
            ',' => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    args.push(current.trim().to_string());

    args
}
