use std::time::{Duration, Instant};

use crate::http::request::RenderedRequest;
use crate::http::response::Response;
use crate::{Result, RuloadError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

/// 请求未单独配置超时时使用的默认值
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP 执行引擎
///
/// 内部的 `reqwest::Client` 自带连接池，克隆开销很小，所有虚拟用户共享一个实例。
#[derive(Clone)]
pub struct Client {
    inner: reqwest::Client,
}

impl Client {
    pub fn new() -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| RuloadError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { inner })
    }

    /// 发送请求并读取完整响应
    ///
    /// 错误按 reqwest 的分类映射为 `Timeout`、`Connection` 或 `Protocol`。
    pub async fn execute(&self, request: &RenderedRequest, timeout: Duration) -> Result<Response> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| RuloadError::InvalidUrl(format!("{}: {}", request.url, e)))?;
        let headers = build_headers(&request.headers)?;

        let mut req = self
            .inner
            .request(request.method.to_reqwest(), url)
            .headers(headers)
            .timeout(timeout);

        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }

        let start = Instant::now();
        let response = req.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;
        let duration = start.elapsed();

        debug!(
            "{} {} -> {} ({}ms)",
            request.method,
            request.url,
            status,
            duration.as_millis()
        );

        Response::new(status, headers, body, duration)
    }
}

fn build_headers(pairs: &[(String, String)]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (key, value) in pairs {
        let name: HeaderName = key
            .parse()
            .map_err(|_| RuloadError::Protocol(format!("Invalid header name: {}", key)))?;
        let value: HeaderValue = value.parse().map_err(|_| {
            RuloadError::Protocol(format!("Invalid value for header {}: {}", key, value))
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}
