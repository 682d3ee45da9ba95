use crate::runner::types::{ExecutionResult, LabelStats, RunSummary};
use crate::{Result, RuloadError};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

/// 执行结果的去向
///
/// 所有虚拟用户并发调用 `record`，实现需自行同步。
pub trait ResultSink: Send + Sync {
    fn record(&self, result: &ExecutionResult);

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// 把结果分发给多个 sink
#[derive(Default, Clone)]
pub struct FanOutSink {
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl FanOutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn push(&mut self, sink: Arc<dyn ResultSink>) {
        self.sinks.push(sink);
    }
}

impl ResultSink for FanOutSink {
    fn record(&self, result: &ExecutionResult) {
        for sink in &self.sinks {
            sink.record(result);
        }
    }

    fn flush(&self) -> Result<()> {
        for sink in &self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}

/// 以 JSON Lines 形式写入原始结果，Body 不写入
///
/// 创建时清空已有文件，每次运行只保留本次的结果。
///
/// 每行在 `fs2` 排他锁内写入，多个运行同时写同一文件也不会交错。
pub struct JsonlSink {
    file_path: PathBuf,
    file: Mutex<File>,
}

impl JsonlSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file_path = path.as_ref().to_path_buf();
        if let Some(parent) = file_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(RuloadError::IoError)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&file_path)
            .map_err(RuloadError::IoError)?;

        Ok(Self {
            file_path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn append(&self, result: &ExecutionResult) -> Result<()> {
        let json = serde_json::to_string(result)?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| RuloadError::Other("result file lock poisoned".to_string()))?;

        file.lock_exclusive().map_err(RuloadError::IoError)?;
        let written = writeln!(file, "{}", json).map_err(RuloadError::IoError);
        FileExt::unlock(&*file).map_err(RuloadError::IoError)?;
        written
    }
}

impl ResultSink for JsonlSink {
    fn record(&self, result: &ExecutionResult) {
        if let Err(e) = self.append(result) {
            warn!("Failed to write result to {}: {}", self.file_path.display(), e);
        }
    }

    fn flush(&self) -> Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| RuloadError::Other("result file lock poisoned".to_string()))?;
        file.flush().map_err(RuloadError::IoError)
    }
}

#[derive(Debug, Default)]
struct LabelSamples {
    latencies: Vec<Duration>,
    request_failures: usize,
    assertion_failures: usize,
}

impl LabelSamples {
    /// 只有完成的请求计入耗时
    fn add(&mut self, result: &ExecutionResult) {
        if !result.completed() {
            self.request_failures += 1;
            return;
        }
        self.latencies.push(result.latency);
        if !result.assertions_passed() {
            self.assertion_failures += 1;
        }
    }
}

#[derive(Debug, Default)]
struct Samples {
    order: Vec<String>,
    labels: HashMap<String, LabelSamples>,
    total: LabelSamples,
}

/// 按标签聚合结果，生成摘要
#[derive(Debug)]
pub struct SummaryCollector {
    started: Instant,
    samples: Mutex<Samples>,
}

impl SummaryCollector {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            samples: Mutex::new(Samples::default()),
        }
    }

    pub fn summary(&self) -> RunSummary {
        let elapsed = self.started.elapsed();
        let Ok(samples) = self.samples.lock() else {
            return RunSummary {
                labels: Vec::new(),
                total: LabelStats::from_samples("TOTAL", &mut [], 0, 0),
                elapsed,
            };
        };

        let labels = samples
            .order
            .iter()
            .filter_map(|label| {
                samples.labels.get(label).map(|s| {
                    LabelStats::from_samples(
                        label.as_str(),
                        &mut s.latencies.clone(),
                        s.request_failures,
                        s.assertion_failures,
                    )
                })
            })
            .collect();

        let total = LabelStats::from_samples(
            "TOTAL",
            &mut samples.total.latencies.clone(),
            samples.total.request_failures,
            samples.total.assertion_failures,
        );

        RunSummary {
            labels,
            total,
            elapsed,
        }
    }
}

impl Default for SummaryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultSink for SummaryCollector {
    fn record(&self, result: &ExecutionResult) {
        let Ok(mut samples) = self.samples.lock() else {
            return;
        };

        if !samples.labels.contains_key(&result.label) {
            samples.order.push(result.label.clone());
        }
        samples
            .labels
            .entry(result.label.clone())
            .or_default()
            .add(result);
        samples.total.add(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::AssertionOutcome;
    use crate::http::Response;
    use reqwest::header::HeaderMap;
    use std::io::{BufRead, BufReader};
    use tempfile::TempDir;

    fn ok(label: &str, ms: u64) -> ExecutionResult {
        let response = Response::new(
            200,
            HeaderMap::new(),
            "{}".to_string(),
            Duration::from_millis(ms),
        )
        .unwrap();
        ExecutionResult::new(1, 1, 1, label, "GET", "http://localhost/x").with_response(response)
    }

    #[test]
    fn test_summary_distinguishes_failures() {
        let collector = SummaryCollector::new();
        collector.record(&ok("products", 10));
        collector.record(&ok("products", 30));
        collector.record(&ok("orders", 20).with_assertions(vec![AssertionOutcome::fail(
            "http-code contains [200]".to_string(),
            "got 404",
        )]));
        collector.record(
            &ExecutionResult::new(1, 1, 3, "orders", "GET", "http://localhost/x").with_failure(
                &RuloadError::Connection("refused".to_string()),
                Duration::from_millis(1),
            ),
        );

        let summary = collector.summary();
        assert_eq!(summary.labels.len(), 2);
        assert_eq!(summary.labels[0].label, "products");
        assert_eq!(summary.labels[0].samples, 2);
        assert_eq!(summary.labels[0].avg, Duration::from_millis(20));
        assert_eq!(summary.labels[1].request_failures, 1);
        assert_eq!(summary.labels[1].assertion_failures, 1);
        assert_eq!(summary.labels[1].samples, 2);
        assert_eq!(summary.samples(), 4);
        assert_eq!(summary.request_failures(), 1);
        assert_eq!(summary.assertion_failures(), 1);
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_failed_requests_excluded_from_latency() {
        let collector = SummaryCollector::new();
        collector.record(&ok("products", 40));
        collector.record(
            &ExecutionResult::new(1, 1, 1, "products", "GET", "${missing}").with_failure(
                &RuloadError::TemplateRender("undefined variable".to_string()),
                Duration::ZERO,
            ),
        );
        collector.record(
            &ExecutionResult::new(1, 2, 1, "products", "GET", "http://localhost/x").with_failure(
                &RuloadError::Timeout("30s".to_string()),
                Duration::from_secs(30),
            ),
        );

        let stats = &collector.summary().labels[0];
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.request_failures, 2);
        assert_eq!(stats.avg, Duration::from_millis(40));
        assert_eq!(stats.p50, Duration::from_millis(40));
        assert_eq!(stats.max, Duration::from_millis(40));
    }

    #[test]
    fn test_jsonl_sink_starts_fresh_on_rerun() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("results.jsonl");

        let first = JsonlSink::create(&path).unwrap();
        first.record(&ok("first run", 5));
        first.record(&ok("first run", 6));
        first.flush().unwrap();
        drop(first);

        let second = JsonlSink::create(&path).unwrap();
        second.record(&ok("second run", 7));
        second.flush().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["label"], "second run");
    }

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out").join("results.jsonl");

        let sink = JsonlSink::create(&path).unwrap();
        sink.record(&ok("a", 5));
        sink.record(&ok("b", 6));
        sink.flush().unwrap();

        let file = File::open(&path).unwrap();
        let lines: Vec<serde_json::Value> = BufReader::new(file)
            .lines()
            .map(|l| serde_json::from_str(&l.unwrap()).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["label"], "a");
        assert_eq!(lines[1]["latency_ms"], 6);
        assert!(lines[1].get("body").is_none());
    }

    #[test]
    fn test_fan_out() {
        let first = Arc::new(SummaryCollector::new());
        let second = Arc::new(SummaryCollector::new());
        let fan_out = FanOutSink::new().with(first.clone()).with(second.clone());

        fan_out.record(&ok("a", 1));
        assert_eq!(first.summary().samples(), 1);
        assert_eq!(second.summary().samples(), 1);
    }
}
