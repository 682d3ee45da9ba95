use crate::http::types::Method;
use serde::Serialize;

/// 渲染完成、可直接发送的请求
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedRequest {
    pub method: Method,
    /// 最终地址，已包含查询参数
    pub url: String,
    /// Headers 列表，保持声明顺序
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RenderedRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// 设置 header，同名（不区分大小写）时替换
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.insert_header(key, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn insert_header(&mut self, key: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some(slot) => slot.1 = value.to_string(),
            None => self.headers.push((key.to_string(), value.to_string())),
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_override_is_case_insensitive() {
        let request = RenderedRequest::new(Method::Post, "http://localhost/products")
            .with_header("Content-Type", "text/plain")
            .with_header("content-type", "application/json")
            .with_body("{}");

        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(request.body.as_deref(), Some("{}"));
    }
}
