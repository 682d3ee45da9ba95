use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use ruload::config::{ScenarioLoader, TestPlan, parse_duration};
use ruload::http::Client;
use ruload::runner::{
    ConsoleReporter, FanOutSink, JsonlSink, ResultSink, Scheduler, StopSignal, SummaryCollector,
};
use ruload::variable::EnvironmentLoader;
use tokio::task::JoinSet;
use tracing::{info, warn};

pub type Result<T> = std::result::Result<T, anyhow::Error>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 输出调试日志与每个虚拟用户的结果
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 运行场景文件
    Run(RunArgs),
    /// 加载场景文件并打印步骤计划，不发送请求
    Validate(PlanArgs),
}

/// 场景文件与变量覆盖
#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// 场景文件（YAML）
    pub file: PathBuf,

    /// ruload.toml 中的环境名
    #[arg(short, long)]
    pub env: Option<String>,

    /// 覆盖全局变量，格式 key=value，可重复
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// 覆盖所有执行的虚拟用户数
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// 覆盖 ramp-up（如 10s、1m）
    #[arg(long)]
    pub ramp_up: Option<String>,

    /// 覆盖 hold-for（如 30s、5m）
    #[arg(long)]
    pub hold_for: Option<String>,

    /// 覆盖每个虚拟用户的迭代次数
    #[arg(short, long)]
    pub iterations: Option<u64>,

    /// 原始结果写入的 JSON Lines 文件
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

/// 加载测试计划：环境覆盖 → `--var` 覆盖 → 场景文件
fn load_plan(args: &PlanArgs) -> Result<TestPlan> {
    let mut cli_vars = Vec::with_capacity(args.vars.len());
    for var in &args.vars {
        let parsed = EnvironmentLoader::parse_cli_var(var)
            .ok_or_else(|| anyhow::anyhow!("Invalid --var '{}', expected key=value", var))?;
        cli_vars.push(parsed);
    }

    let env_config = EnvironmentLoader::find_and_load();
    let overrides =
        EnvironmentLoader::build_overrides(env_config.as_ref(), args.env.as_deref(), &cli_vars)?;

    Ok(ScenarioLoader::load_from_path(&args.file, &overrides)?)
}

/// 命令行的负载参数覆盖场景文件中的配置
fn apply_profile_overrides(plan: &mut TestPlan, args: &RunArgs) -> Result<()> {
    let ramp_up = args.ramp_up.as_deref().map(parse_duration).transpose()?;
    let hold_for = args.hold_for.as_deref().map(parse_duration).transpose()?;
    if args.concurrency == Some(0) {
        anyhow::bail!("--concurrency must be at least 1");
    }

    for execution in &mut plan.executions {
        let profile = &mut execution.profile;
        if let Some(concurrency) = args.concurrency {
            profile.concurrency = concurrency;
        }
        if let Some(ramp_up) = ramp_up {
            profile.ramp_up = ramp_up;
        }
        if let Some(hold_for) = hold_for {
            profile.hold_for = Some(hold_for);
        }
        if let Some(iterations) = args.iterations {
            profile.iterations = Some(iterations);
        }
    }
    Ok(())
}

/// 运行场景，返回是否没有任何失败
pub async fn run(args: RunArgs, verbose: bool) -> Result<bool> {
    let mut plan = load_plan(&args.plan)?;
    apply_profile_overrides(&mut plan, &args)?;

    let reporter = ConsoleReporter::new(verbose);
    reporter.print_header(&plan);

    let collector = Arc::new(SummaryCollector::new());
    let mut sinks = FanOutSink::new().with(collector.clone());
    if let Some(path) = args.report.clone().or_else(|| plan.report.dump_jsonl.clone()) {
        let jsonl = JsonlSink::create(&path)?;
        info!("Writing raw results to {}", jsonl.path().display());
        sinks.push(Arc::new(jsonl));
    }
    let sink: Arc<dyn ResultSink> = Arc::new(sinks);

    // Ctrl-C：不再开始新的迭代
    let global = StopSignal::new();
    {
        let global = global.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, waiting for in-flight requests...");
                global.stop();
            }
        });
    }

    let scheduler = Arc::new(Scheduler::new(Client::new()?));
    let mut tasks = JoinSet::new();
    for (index, execution) in plan.executions.iter().cloned().enumerate() {
        let scheduler = scheduler.clone();
        let sink = sink.clone();
        let global = global.clone();
        tasks.spawn(async move {
            let report = scheduler
                .run(execution.scenario, execution.profile, sink, global)
                .await;
            (index, report)
        });
    }

    let mut reports = Vec::with_capacity(plan.executions.len());
    while let Some(joined) = tasks.join_next().await {
        reports.push(joined?);
    }
    reports.sort_by_key(|(index, _)| *index);
    let reports: Vec<_> = reports.into_iter().map(|(_, report)| report).collect();

    sink.flush()?;

    reporter.print_executions(&reports);
    let summary = collector.summary();
    if plan.report.final_stats {
        reporter.print_summary(&summary);
    }
    Ok(summary.is_clean())
}

/// 校验场景文件
pub fn validate(args: PlanArgs, verbose: bool) -> Result<()> {
    let plan = load_plan(&args)?;
    ConsoleReporter::new(verbose).print_plan(&plan);
    Ok(())
}
