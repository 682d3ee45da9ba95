use crate::assertion::evaluate_all;
use crate::http::Client;
use crate::http::response::headers_to_text;
use crate::render::RequestRenderer;
use crate::runner::scheduler::StopSignal;
use crate::runner::sink::ResultSink;
use crate::runner::types::{ExecutionResult, Flow};
use crate::scenario::{Action, FailurePolicy, RequestStep, Scenario, Step};
use crate::variable::VariableStore;
use crate::Result;
use chrono::Utc;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 迭代标识
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationContext {
    pub user: usize,
    pub iteration: u64,
}

/// 一次迭代的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationOutcome {
    pub flow: Flow,
    /// 实际发出的请求数，渲染失败或被动作跳过的步骤不计
    pub requests_sent: usize,
}

/// 执行场景中的步骤
///
/// 同一个虚拟用户内步骤严格按声明顺序执行，任一时刻只有一个请求在途。
pub struct StepExecutor {
    client: Client,
    scenario: Arc<Scenario>,
    sink: Arc<dyn ResultSink>,
    stop: StopSignal,
}

impl StepExecutor {
    pub fn new(
        client: Client,
        scenario: Arc<Scenario>,
        sink: Arc<dyn ResultSink>,
        stop: StopSignal,
    ) -> Self {
        Self {
            client,
            scenario,
            sink,
            stop,
        }
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// 执行一次完整迭代
    ///
    /// 迭代开始时创建新的变量作用域并合并数据源的一行；
    /// 数据源耗尽时返回 `DataExhausted`。
    pub async fn run_iteration(&self, ctx: IterationContext) -> Result<IterationOutcome> {
        let mut store = self.scenario.new_store();
        let row = self.scenario.feeders.next_rows()?;
        store.merge_row(&row);

        debug!(
            "user {} iteration {} started ({} variables from data sources)",
            ctx.user,
            ctx.iteration,
            row.len()
        );

        let mut requests_sent = 0;
        let flow = self
            .run_steps(&self.scenario.steps, &mut store, &mut requests_sent, ctx)
            .await;
        Ok(IterationOutcome {
            flow,
            requests_sent,
        })
    }

    /// 执行步骤列表；条件步骤递归进入嵌套步骤
    fn run_steps<'a>(
        &'a self,
        steps: &'a [Step],
        store: &'a mut VariableStore,
        sent: &'a mut usize,
        ctx: IterationContext,
    ) -> Pin<Box<dyn Future<Output = Flow> + Send + 'a>> {
        Box::pin(async move {
            for step in steps {
                let flow = match step {
                    Step::Request(request) => self.run_request(request, store, sent, ctx).await,
                    Step::Control(control) => match control.guard.evaluate(store) {
                        Ok(true) => self.run_steps(&control.then, store, sent, ctx).await,
                        Ok(false) => self.run_steps(&control.otherwise, store, sent, ctx).await,
                        Err(e) => {
                            warn!(
                                "user {} iteration {}: guard '{}' failed: {}",
                                ctx.user, ctx.iteration, control.guard, e
                            );
                            Flow::NextIteration
                        }
                    },
                    Step::Action(action) => match action {
                        Action::Continue => Flow::NextIteration,
                        Action::Break => Flow::StopUser,
                        Action::Stop => Flow::StopAll,
                    },
                };

                if flow != Flow::Next {
                    return flow;
                }
            }
            Flow::Next
        })
    }

    /// think-time → 渲染 → 发送 → 提取 → 断言 → 记录
    async fn run_request(
        &self,
        step: &RequestStep,
        store: &mut VariableStore,
        sent: &mut usize,
        ctx: IterationContext,
    ) -> Flow {
        // 1. think-time；等待期间收到停止信号则不再发送
        let think_time = step.think_time.unwrap_or(self.scenario.think_time);
        if !think_time.is_none() {
            let delay = think_time.sample();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.stop.wait() => return Flow::StopUser,
            }
        }

        let result = ExecutionResult::new(
            ctx.user,
            ctx.iteration,
            step.position,
            step.label.as_str(),
            step.method.as_str(),
            step.url.as_str(),
        );

        // 2. 渲染失败对该步骤致命，放弃本次迭代
        let rendered = match RequestRenderer::render(step, store, &self.scenario) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(
                    "user {} iteration {}: cannot render '{}': {}",
                    ctx.user, ctx.iteration, step.label, e
                );
                let result = result.with_failure(&e, Duration::ZERO);
                self.sink.record(&result);
                return Flow::NextIteration;
            }
        };

        // 3. 发送
        let timeout = step.timeout.unwrap_or(self.scenario.timeout);
        let timestamp = Utc::now();
        let start = Instant::now();
        let mut result = ExecutionResult {
            url: rendered.url.clone(),
            ..result
        }
        .with_timestamp(timestamp);

        *sent += 1;
        result = match self.client.execute(&rendered, timeout).await {
            Ok(response) => result.with_response(response),
            Err(e) => {
                warn!(
                    "user {} iteration {}: {} {} failed: {}",
                    ctx.user, ctx.iteration, rendered.method, rendered.url, e
                );
                result.with_failure(&e, start.elapsed())
            }
        };

        // 4. 提取：未匹配或请求失败时写入默认值
        if !step.extractions.is_empty() {
            let headers_text = headers_to_text(&result.headers);
            for extraction in &step.extractions {
                let value = extraction.apply(&result.body, &headers_text);
                store.set(extraction.name.as_str(), value);
            }
        }

        // 5. 断言
        let outcomes = evaluate_all(&step.assertions, &result);
        let result = result.with_assertions(outcomes);

        // 6. 记录
        self.sink.record(&result);

        if result.completed() {
            return Flow::Next;
        }
        match self.scenario.failure_policy {
            FailurePolicy::Continue => Flow::Next,
            FailurePolicy::AbortIteration => Flow::NextIteration,
            FailurePolicy::StopUser => Flow::StopUser,
        }
    }
}
