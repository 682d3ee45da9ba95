use crate::{Result, RuloadError};
use serde_json::Value as Json;
use std::fmt;

/// 路径段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `.name` 或 `['name']`
    Child(String),
    /// `[n]`，负数从末尾计
    Index(i64),
    /// `.*` 或 `[*]`
    Wildcard,
    /// `..name`；`None` 表示 `..*`
    Descendant(Option<String>),
}

/// 编译后的 JSON path 表达式
///
/// 支持的语法：`$`、`.name`、`['name']`、`..name`、`.*`、`[*]`、`..*`、`[index]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        let rest = raw.strip_prefix('$').ok_or_else(|| invalid(raw, "must start with '$'"))?;

        let chars: Vec<char> = rest.chars().collect();
        let mut segments = Vec::new();
        let mut pos = 0;

        while pos < chars.len() {
            match chars[pos] {
                '.' if chars.get(pos + 1) == Some(&'.') => {
                    pos += 2;
                    match chars.get(pos) {
                        Some('*') => {
                            segments.push(Segment::Descendant(None));
                            pos += 1;
                        }
                        Some('[') => {
                            let (segment, next) = parse_bracket(raw, &chars, pos)?;
                            match segment {
                                Segment::Child(name) => {
                                    segments.push(Segment::Descendant(Some(name)))
                                }
                                Segment::Wildcard => segments.push(Segment::Descendant(None)),
                                Segment::Index(_) | Segment::Descendant(_) => {
                                    return Err(invalid(raw, "index after '..' is not supported"));
                                }
                            }
                            pos = next;
                        }
                        _ => {
                            let (name, next) = parse_name(raw, &chars, pos)?;
                            segments.push(Segment::Descendant(Some(name)));
                            pos = next;
                        }
                    }
                }
                '.' => {
                    pos += 1;
                    if chars.get(pos) == Some(&'*') {
                        segments.push(Segment::Wildcard);
                        pos += 1;
                    } else {
                        let (name, next) = parse_name(raw, &chars, pos)?;
                        segments.push(Segment::Child(name));
                        pos = next;
                    }
                }
                '[' => {
                    let (segment, next) = parse_bracket(raw, &chars, pos)?;
                    segments.push(segment);
                    pos = next;
                }
                other => {
                    return Err(invalid(raw, &format!("unexpected character '{}'", other)));
                }
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// 对文档求值，按文档顺序返回所有匹配
    pub fn query<'a>(&self, root: &'a Json) -> Vec<&'a Json> {
        let mut current = vec![root];

        for segment in &self.segments {
            let mut next = Vec::new();
            for node in current {
                match segment {
                    Segment::Child(name) => {
                        if let Some(value) = node.get(name.as_str()) {
                            next.push(value);
                        }
                    }
                    Segment::Index(index) => {
                        if let Some(items) = node.as_array() {
                            let resolved = if *index < 0 {
                                items.len() as i64 + index
                            } else {
                                *index
                            };
                            if resolved >= 0 {
                                if let Some(value) = items.get(resolved as usize) {
                                    next.push(value);
                                }
                            }
                        }
                    }
                    Segment::Wildcard => next.extend(children(node)),
                    Segment::Descendant(name) => collect_descendants(node, name.as_deref(), &mut next),
                }
            }
            current = next;
        }

        current
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn invalid(raw: &str, reason: &str) -> RuloadError {
    RuloadError::Config(format!("Invalid JSON path '{}': {}", raw, reason))
}

fn parse_name(raw: &str, chars: &[char], start: usize) -> Result<(String, usize)> {
    let mut end = start;
    while end < chars.len() && chars[end] != '.' && chars[end] != '[' {
        end += 1;
    }
    if end == start {
        return Err(invalid(raw, "empty field name"));
    }
    Ok((chars[start..end].iter().collect(), end))
}

/// 解析 `[...]`，`start` 指向 `[`
fn parse_bracket(raw: &str, chars: &[char], start: usize) -> Result<(Segment, usize)> {
    let close = chars[start..]
        .iter()
        .position(|c| *c == ']')
        .map(|offset| start + offset)
        .ok_or_else(|| invalid(raw, "unclosed '['"))?;
    let inner: String = chars[start + 1..close].iter().collect();
    let inner = inner.trim();

    let segment = if inner == "*" {
        Segment::Wildcard
    } else if inner.len() >= 2
        && ((inner.starts_with('\'') && inner.ends_with('\''))
            || (inner.starts_with('"') && inner.ends_with('"')))
    {
        Segment::Child(inner[1..inner.len() - 1].to_string())
    } else {
        let index = inner
            .parse::<i64>()
            .map_err(|_| invalid(raw, &format!("unsupported selector [{}]", inner)))?;
        Segment::Index(index)
    };

    Ok((segment, close + 1))
}

fn children(node: &Json) -> Vec<&Json> {
    match node {
        Json::Object(map) => map.values().collect(),
        Json::Array(items) => items.iter().collect(),
        _ => Vec::new(),
    }
}

/// 先序遍历：先检查当前节点，再依次进入子节点
fn collect_descendants<'a>(node: &'a Json, name: Option<&str>, out: &mut Vec<&'a Json>) {
    if let (Some(name), Some(map)) = (name, node.as_object()) {
        if let Some(value) = map.get(name) {
            out.push(value);
        }
    }

    for child in children(node) {
        if name.is_none() {
            out.push(child);
        }
        collect_descendants(child, name, out);
    }
}
