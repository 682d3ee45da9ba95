use std::fmt;
use std::str::FromStr;

use crate::{Result, RuloadError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl FromStr for Method {
    type Err = RuloadError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            _ => Err(RuloadError::Config(format!("Invalid HTTP method: {}", s))),
        }
    }
}

impl Method {
    pub fn parse(s: &str) -> Result<Self> {
        s.parse()
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 默认 host，当地址中未指定 host 时使用
const DEFAULT_HOST: &str = "localhost";
/// 默认 scheme，当地址中未指定 scheme 时使用
const DEFAULT_SCHEME: &str = "http";

/// 规范化 `default-address`
///
/// 支持的简化格式:
/// 1. ":3000" -> "http://localhost:3000"
/// 2. "localhost:3000" -> "http://localhost:3000"
/// 3. "https://:8080" -> "https://localhost:8080"
pub fn normalize_address(s: &str) -> Result<url::Url> {
    let input = s.trim();

    let normalized = if input.starts_with(':') {
        format!("{}://{}{}", DEFAULT_SCHEME, DEFAULT_HOST, input)
    } else if !input.contains("://") {
        format!("{}://{}", DEFAULT_SCHEME, input)
    } else if let Some(pos) = input.find("://") {
        let after_scheme = &input[pos + 3..];
        if after_scheme.starts_with(':') {
            format!("{}://{}{}", &input[..pos], DEFAULT_HOST, after_scheme)
        } else {
            input.to_string()
        }
    } else {
        input.to_string()
    };

    let url = url::Url::parse(&normalized)
        .map_err(|e| RuloadError::InvalidUrl(format!("{}: {}", s, e)))?;
    if url.host_str().is_none() {
        return Err(RuloadError::InvalidUrl(format!("{}: missing host", s)));
    }
    Ok(url)
}

/// 组合最终请求地址
///
/// 带 scheme 的 URL 原样使用；否则拼接到默认地址之后。
pub fn resolve_url(
    base: Option<&url::Url>,
    rendered: &str,
    query: &[(String, String)],
) -> Result<url::Url> {
    let rendered = rendered.trim();

    let mut url = if has_scheme(rendered) {
        url::Url::parse(rendered).map_err(|e| RuloadError::InvalidUrl(format!("{}: {}", rendered, e)))?
    } else {
        let base = base.ok_or_else(|| {
            RuloadError::InvalidUrl(format!(
                "{}: relative URL but no default-address configured",
                rendered
            ))
        })?;
        let joined = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            rendered.trim_start_matches('/')
        );
        url::Url::parse(&joined).map_err(|e| RuloadError::InvalidUrl(format!("{}: {}", joined, e)))?
    };

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }

    Ok(url)
}

/// 是否以 `scheme://` 开头；查询串或路径中出现的 `://` 不算
fn has_scheme(url: &str) -> bool {
    let Some((scheme, _)) = url.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Status(u16);

impl Status {
    pub fn new(code: u16) -> Result<Self> {
        if (100..600).contains(&code) {
            Ok(Self(code))
        } else {
            Err(RuloadError::Protocol(format!(
                "Invalid HTTP status code: {}",
                code
            )))
        }
    }

    pub fn code(&self) -> u16 {
        self.0
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.0)
    }

    pub fn is_client_error(&self) -> bool {
        (400..=499).contains(&self.0)
    }

    pub fn is_server_error(&self) -> bool {
        (500..=599).contains(&self.0)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
