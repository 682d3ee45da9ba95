use crate::RuloadError;
use crate::assertion::AssertionOutcome;
use crate::http::Response;
use crate::runner::serialization;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::Serialize;
use std::time::Duration;

/// 请求未完成的原因分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// 模板渲染或 URL 解析失败，请求没有发出
    Render,
    Connection,
    Timeout,
    Protocol,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Render => "render",
            FailureKind::Connection => "connection",
            FailureKind::Timeout => "timeout",
            FailureKind::Protocol => "protocol",
        }
    }
}

/// 请求级失败
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl RequestFailure {
    pub fn from_error(err: &RuloadError) -> Self {
        let kind = match err {
            RuloadError::Connection(_) => FailureKind::Connection,
            RuloadError::Timeout(_) => FailureKind::Timeout,
            RuloadError::Protocol(_) => FailureKind::Protocol,
            _ => FailureKind::Render,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// 单个请求的执行结果，创建后只读
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// 虚拟用户编号（从 1 开始）
    pub user: usize,

    /// 该用户的迭代序号（从 1 开始）
    pub iteration: u64,

    /// 步骤在场景中的位置（从 1 开始）
    pub step: usize,

    pub label: String,

    pub method: String,

    /// 渲染后的 URL；渲染失败时为原始模板
    pub url: String,

    /// 请求发出时间
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "latency_ms", with = "serialization::duration_ms")]
    pub latency: Duration,

    pub status: Option<u16>,

    #[serde(with = "serialization::header_map")]
    pub headers: HeaderMap,

    /// 响应 Body 只在内存中保留，供提取和断言使用
    #[serde(skip)]
    pub body: String,

    pub failure: Option<RequestFailure>,

    pub assertions: Vec<AssertionOutcome>,
}

impl ExecutionResult {
    pub fn new(
        user: usize,
        iteration: u64,
        step: usize,
        label: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            user,
            iteration,
            step,
            label: label.into(),
            method: method.into(),
            url: url.into(),
            timestamp: Utc::now(),
            latency: Duration::ZERO,
            status: None,
            headers: HeaderMap::new(),
            body: String::new(),
            failure: None,
            assertions: Vec::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 请求完成，记录状态码、Header、Body 和耗时
    pub fn with_response(mut self, response: Response) -> Self {
        self.status = Some(response.status.code());
        self.latency = response.duration;
        self.headers = response.headers;
        self.body = response.body;
        self
    }

    /// 请求未完成
    pub fn with_failure(mut self, err: &RuloadError, latency: Duration) -> Self {
        self.failure = Some(RequestFailure::from_error(err));
        self.latency = latency;
        self
    }

    pub fn with_assertions(mut self, assertions: Vec<AssertionOutcome>) -> Self {
        self.assertions = assertions;
        self
    }

    /// 请求是否完成（收到了响应）
    pub fn completed(&self) -> bool {
        self.failure.is_none()
    }

    pub fn assertions_passed(&self) -> bool {
        self.assertions.iter().all(|a| a.passed())
    }

    /// 请求完成且全部断言通过
    pub fn passed(&self) -> bool {
        self.completed() && self.assertions_passed()
    }

    pub fn failed_assertions(&self) -> impl Iterator<Item = &AssertionOutcome> {
        self.assertions.iter().filter(|a| !a.passed())
    }
}

/// 单个标签的统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelStats {
    pub label: String,
    pub samples: usize,
    /// 请求本身未完成的次数
    pub request_failures: usize,
    /// 请求完成但断言失败的次数
    pub assertion_failures: usize,
    #[serde(with = "serialization::duration_ms")]
    pub avg: Duration,
    #[serde(with = "serialization::duration_ms")]
    pub p50: Duration,
    #[serde(with = "serialization::duration_ms")]
    pub p90: Duration,
    #[serde(with = "serialization::duration_ms")]
    pub p99: Duration,
    #[serde(with = "serialization::duration_ms")]
    pub max: Duration,
}

impl LabelStats {
    /// 由已完成请求的耗时计算统计值，`latencies` 会被排序
    ///
    /// 未完成的请求只计入 `request_failures` 和样本数，不参与耗时统计。
    pub fn from_samples(
        label: impl Into<String>,
        latencies: &mut [Duration],
        request_failures: usize,
        assertion_failures: usize,
    ) -> Self {
        latencies.sort_unstable();
        let samples = latencies.len() + request_failures;
        let total: Duration = latencies.iter().sum();
        let avg = if latencies.is_empty() {
            Duration::ZERO
        } else {
            total / latencies.len() as u32
        };

        Self {
            label: label.into(),
            samples,
            request_failures,
            assertion_failures,
            avg,
            p50: percentile(latencies, 50.0),
            p90: percentile(latencies, 90.0),
            p99: percentile(latencies, 99.0),
            max: latencies.last().copied().unwrap_or_default(),
        }
    }

    pub fn passed(&self) -> usize {
        self.samples - self.request_failures - self.assertion_failures
    }

    pub fn error_rate(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            (self.request_failures + self.assertion_failures) as f64 / self.samples as f64
        }
    }
}

/// 最近秩百分位，输入须已排序
pub fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.clamp(1, sorted.len()) - 1;
    sorted[index]
}

/// 整次运行的摘要
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// 按标签首次出现的顺序排列
    pub labels: Vec<LabelStats>,
    pub total: LabelStats,
    #[serde(with = "serialization::duration_ms")]
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn samples(&self) -> usize {
        self.total.samples
    }

    pub fn request_failures(&self) -> usize {
        self.total.request_failures
    }

    pub fn assertion_failures(&self) -> usize {
        self.total.assertion_failures
    }

    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.total.samples as f64 / secs
        }
    }

    /// 没有任何失败
    pub fn is_clean(&self) -> bool {
        self.request_failures() == 0 && self.assertion_failures() == 0
    }
}

/// 执行一个步骤后迭代如何继续
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// 执行下一个步骤
    Next,
    /// 跳过本次迭代剩余步骤，开始下一次迭代
    NextIteration,
    /// 当前虚拟用户停止
    StopUser,
    /// 全局停止
    StopAll,
}
