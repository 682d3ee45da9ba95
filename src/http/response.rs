use crate::Result;
use crate::http::types::Status;
use reqwest::header::HeaderMap as Headers;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Response {
    pub status: Status,
    pub headers: Headers,
    pub body: String,
    pub duration: Duration,
}

impl Response {
    pub fn new(status: u16, headers: Headers, body: String, duration: Duration) -> Result<Self> {
        Ok(Self {
            status: Status::new(status)?,
            headers,
            body,
            duration,
        })
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// 所有 header 拼成 `name: value` 行，供断言和正则提取使用
    pub fn headers_text(&self) -> String {
        headers_to_text(&self.headers)
    }
}

pub fn headers_to_text(headers: &Headers) -> String {
    headers
        .iter()
        .map(|(key, value)| format!("{}: {}", key, value.to_str().unwrap_or("<invalid utf-8>")))
        .collect::<Vec<_>>()
        .join("\n")
}
