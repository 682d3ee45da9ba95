use crate::RuloadError;
use crate::http::Client;
use crate::runner::executor::{IterationContext, StepExecutor};
use crate::runner::sink::ResultSink;
use crate::runner::types::Flow;
use crate::scenario::Scenario;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// 停止信号
///
/// 触发后不再开始新的迭代，在途请求按各自的超时自然结束。
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// 等待直到触发
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// 负载配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadProfile {
    pub concurrency: usize,
    pub ramp_up: Duration,
    pub hold_for: Option<Duration>,
    /// 每个虚拟用户的迭代上限
    pub iterations: Option<u64>,
}

impl Default for LoadProfile {
    fn default() -> Self {
        Self {
            concurrency: 1,
            ramp_up: Duration::ZERO,
            hold_for: None,
            iterations: None,
        }
    }
}

impl LoadProfile {
    /// 第 `user` 个虚拟用户（从 1 开始）的启动时间：`ramp_up * user / concurrency`
    pub fn start_offset(&self, user: usize) -> Duration {
        if self.concurrency == 0 || self.ramp_up.is_zero() {
            return Duration::ZERO;
        }
        let user = user.min(self.concurrency) as u128;
        let nanos = self.ramp_up.as_nanos() * user / self.concurrency as u128;
        Duration::from_nanos(nanos as u64)
    }

    /// 时刻 `t` 已启动的虚拟用户数，单调不减，`t >= ramp_up` 时等于 `concurrency`
    pub fn active_at(&self, t: Duration) -> usize {
        (1..=self.concurrency)
            .take_while(|user| self.start_offset(*user) <= t)
            .count()
    }

    /// 运行截止时间；未配置 hold-for 时没有截止时间
    pub fn deadline(&self) -> Option<Duration> {
        self.hold_for.map(|hold| self.ramp_up + hold)
    }

    /// 每个虚拟用户的迭代上限；hold-for 与 iterations 都没有时只跑一次
    pub fn iteration_cap(&self) -> Option<u64> {
        match (self.hold_for, self.iterations) {
            (_, Some(n)) => Some(n),
            (None, None) => Some(1),
            (Some(_), None) => None,
        }
    }
}

/// 虚拟用户结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOutcome {
    /// 达到迭代上限
    Completed,
    /// 执行了 `break` 或失败策略要求停止
    Break,
    /// 收到停止信号（hold-for 到期、`stop` 动作或外部中断）
    Stopped,
    /// 数据源耗尽
    DataExhausted,
    /// 启动前已停止
    NotStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserReport {
    pub user: usize,
    pub iterations: u64,
    pub outcome: UserOutcome,
}

/// 一次执行的结果
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub scenario: String,
    pub users: Vec<UserReport>,
    pub elapsed: Duration,
}

impl ExecutionReport {
    pub fn iterations(&self) -> u64 {
        self.users.iter().map(|u| u.iterations).sum()
    }

    pub fn started_users(&self) -> usize {
        self.users
            .iter()
            .filter(|u| u.outcome != UserOutcome::NotStarted)
            .count()
    }
}

/// 场景调度器
///
/// 每个虚拟用户是一个独立的 tokio 任务，按 ramp-up 线性启动。
pub struct Scheduler {
    client: Client,
}

impl Scheduler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// 运行一个场景直到截止、全部用户结束或收到全局停止信号
    pub async fn run(
        &self,
        scenario: Arc<Scenario>,
        profile: LoadProfile,
        sink: Arc<dyn ResultSink>,
        global: StopSignal,
    ) -> ExecutionReport {
        let started = Instant::now();
        let local = StopSignal::new();

        info!(
            "Starting scenario '{}': {} users, ramp-up {}, hold-for {}",
            scenario.name,
            profile.concurrency,
            humantime::format_duration(profile.ramp_up),
            profile
                .hold_for
                .map(|d| humantime::format_duration(d).to_string())
                .unwrap_or_else(|| "-".to_string()),
        );

        // 全局停止或 hold-for 到期都会停止本次执行
        let watcher = {
            let local = local.clone();
            let global = global.clone();
            let deadline = profile.deadline();
            tokio::spawn(async move {
                let expiry = async {
                    match deadline {
                        Some(d) => tokio::time::sleep(d).await,
                        None => std::future::pending::<()>().await,
                    }
                };
                tokio::select! {
                    _ = expiry => debug!("hold-for expired"),
                    _ = global.wait() => {}
                    _ = local.wait() => {}
                }
                local.stop();
            })
        };

        let executor = Arc::new(StepExecutor::new(
            self.client.clone(),
            scenario.clone(),
            sink,
            local.clone(),
        ));

        let mut users = JoinSet::new();
        for user in 1..=profile.concurrency {
            let offset = profile.start_offset(user);
            let executor = executor.clone();
            let local = local.clone();
            let global = global.clone();
            users.spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(offset) => {}
                    _ = local.wait() => {
                        return UserReport { user, iterations: 0, outcome: UserOutcome::NotStarted };
                    }
                }
                run_user(user, &executor, profile.iteration_cap(), &local, &global).await
            });
        }

        let mut reports = Vec::with_capacity(profile.concurrency);
        while let Some(joined) = users.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => warn!("virtual user task failed: {}", e),
            }
        }
        reports.sort_by_key(|r| r.user);

        local.stop();
        let _ = watcher.await;

        let report = ExecutionReport {
            scenario: scenario.name.clone(),
            users: reports,
            elapsed: started.elapsed(),
        };
        info!(
            "Scenario '{}' finished: {} iterations in {:.3}s",
            report.scenario,
            report.iterations(),
            report.elapsed.as_secs_f64()
        );
        report
    }
}

/// 未发出任何请求的迭代之后的等待时间
const IDLE_ITERATION_BACKOFF: Duration = Duration::from_millis(10);

/// 单个虚拟用户的迭代循环
async fn run_user(
    user: usize,
    executor: &StepExecutor,
    cap: Option<u64>,
    local: &StopSignal,
    global: &StopSignal,
) -> UserReport {
    debug!("user {} started", user);
    let mut iterations = 0;

    let outcome = loop {
        if local.is_stopped() {
            break UserOutcome::Stopped;
        }
        if cap.is_some_and(|cap| iterations >= cap) {
            break UserOutcome::Completed;
        }

        iterations += 1;
        let ctx = IterationContext {
            user,
            iteration: iterations,
        };

        let requests_sent = match executor.run_iteration(ctx).await {
            Ok(outcome) => match outcome.flow {
                Flow::Next | Flow::NextIteration => outcome.requests_sent,
                Flow::StopUser if local.is_stopped() => break UserOutcome::Stopped,
                Flow::StopUser => break UserOutcome::Break,
                Flow::StopAll => {
                    info!("user {} requested stop", user);
                    global.stop();
                    break UserOutcome::Stopped;
                }
            },
            Err(RuloadError::DataExhausted(source)) => {
                warn!("Data source '{}' exhausted, no new iterations", source);
                iterations -= 1;
                local.stop();
                break UserOutcome::DataExhausted;
            }
            Err(e) => {
                warn!("user {} iteration {} aborted: {}", user, iterations, e);
                0
            }
        };

        // 没有发出请求的迭代不会让出执行权，需要主动让出并稍作等待
        if requests_sent > 0 {
            tokio::task::yield_now().await;
        } else if cap.is_none_or(|cap| iterations < cap) {
            tokio::select! {
                _ = tokio::time::sleep(IDLE_ITERATION_BACKOFF) => {}
                _ = local.wait() => {}
            }
        }
    };

    debug!("user {} finished after {} iterations", user, iterations);
    UserReport {
        user,
        iterations,
        outcome,
    }
}
