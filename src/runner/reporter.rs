use crate::config::TestPlan;
use crate::runner::scheduler::{ExecutionReport, UserOutcome};
use crate::runner::types::{LabelStats, RunSummary};
use crate::scenario::{Step, Scenario};
use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table};
use std::time::Duration;

/// 控制台报告
pub struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// 打印运行开始
    pub fn print_header(&self, plan: &TestPlan) {
        println!(
            "\nRunning {} execution(s) from {}...\n",
            plan.executions.len(),
            plan.source.display().to_string().bold()
        );
        for execution in &plan.executions {
            let profile = &execution.profile;
            println!(
                "  {} {} users, ramp-up {}, {}",
                execution.scenario.name.cyan(),
                profile.concurrency,
                humantime::format_duration(profile.ramp_up),
                match (profile.hold_for, profile.iteration_cap()) {
                    (Some(hold), Some(cap)) => format!(
                        "hold-for {} (max {} iterations)",
                        humantime::format_duration(hold),
                        cap
                    ),
                    (Some(hold), None) => format!("hold-for {}", humantime::format_duration(hold)),
                    (None, cap) => format!("{} iteration(s) per user", cap.unwrap_or(1)),
                }
            );
        }
        println!();
    }

    /// 打印每次执行的虚拟用户情况
    pub fn print_executions(&self, reports: &[ExecutionReport]) {
        for report in reports {
            let stopped_early = report
                .users
                .iter()
                .filter(|u| matches!(u.outcome, UserOutcome::Break | UserOutcome::DataExhausted))
                .count();
            let mut line = format!(
                " {} {}: {} users, {} iterations ({:.3}s)",
                "•".dimmed(),
                report.scenario.bold(),
                report.started_users(),
                report.iterations(),
                report.elapsed.as_secs_f64()
            );
            if stopped_early > 0 {
                line.push_str(&format!(", {} ended early", stopped_early).yellow().to_string());
            }
            println!("{}", line);

            if self.verbose {
                for user in &report.users {
                    println!(
                        "     user {:>3}: {:>5} iterations, {:?}",
                        user.user, user.iterations, user.outcome
                    );
                }
            }
        }
    }

    /// 打印摘要表与总计
    pub fn print_summary(&self, summary: &RunSummary) {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(vec![
            "Label", "Samples", "Req Fail", "Assert Fail", "Avg", "P50", "P90", "P99", "Max",
        ]);

        for stats in &summary.labels {
            table.add_row(stats_row(stats, false));
        }
        if summary.labels.len() > 1 {
            table.add_row(stats_row(&summary.total, true));
        }

        println!("\n{}", table);

        println!("\n{}", "━".repeat(50));
        println!("{}", "Summary".bold());
        println!("{}", "━".repeat(50));

        let passed = summary.total.passed();
        if summary.is_clean() {
            println!(
                "  {}: {} passed, {} total",
                "Requests".bold(),
                passed.to_string().green(),
                summary.samples()
            );
        } else {
            println!(
                "  {}: {} passed, {} failed to complete, {} failed assertions, {} total",
                "Requests".bold(),
                passed.to_string().green(),
                summary.request_failures().to_string().red(),
                summary.assertion_failures().to_string().yellow(),
                summary.samples()
            );
        }
        println!(
            "  {}: {:.1} req/s",
            "Throughput".bold(),
            summary.throughput()
        );
        println!(
            "  {}: {:.3}s",
            "Duration".bold(),
            summary.elapsed.as_secs_f64()
        );
        println!();
    }

    /// 打印场景的步骤计划（`validate` 子命令）
    pub fn print_plan(&self, plan: &TestPlan) {
        println!("{} {}", "✓".green(), plan.source.display().to_string().bold());
        for execution in &plan.executions {
            let scenario = &execution.scenario;
            println!(
                "\n  Scenario {} ({} data source(s), {} request step(s))",
                scenario.name.cyan(),
                scenario.feeders.len(),
                scenario.requests().len()
            );
            if let Some(address) = &scenario.default_address {
                println!("    default-address: {}", address);
            }
            print_steps(scenario, &scenario.steps, 2);
        }
        println!();
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new(false)
    }
}

fn print_steps(scenario: &Scenario, steps: &[Step], depth: usize) {
    let indent = "  ".repeat(depth);
    for step in steps {
        match step {
            Step::Request(request) => {
                let think_time = request.think_time.unwrap_or(scenario.think_time);
                let mut extras = Vec::new();
                if !request.assertions.is_empty() {
                    extras.push(format!("{} assert", request.assertions.len()));
                }
                if !request.extractions.is_empty() {
                    extras.push(format!("{} extract", request.extractions.len()));
                }
                if !think_time.is_none() {
                    extras.push(format!("think {}", think_time));
                }
                println!(
                    "{}[{}] {} {} {}",
                    indent,
                    request.position,
                    request.method.as_str().cyan(),
                    request.url,
                    if extras.is_empty() {
                        String::new()
                    } else {
                        format!("({})", extras.join(", ")).dimmed().to_string()
                    }
                );
            }
            Step::Control(control) => {
                println!("{}{} {}", indent, "if".magenta(), control.guard);
                print_steps(scenario, &control.then, depth + 1);
                if !control.otherwise.is_empty() {
                    println!("{}{}", indent, "else".magenta());
                    print_steps(scenario, &control.otherwise, depth + 1);
                }
            }
            Step::Action(action) => println!("{}{} {}", indent, "action".magenta(), action),
        }
    }
}

fn stats_row(stats: &LabelStats, total: bool) -> Vec<Cell> {
    let label = Cell::new(&stats.label);
    let label = if total {
        label.add_attribute(Attribute::Bold)
    } else {
        label
    };

    vec![
        label,
        Cell::new(stats.samples).set_alignment(CellAlignment::Right),
        count_cell(stats.request_failures, Color::Red),
        count_cell(stats.assertion_failures, Color::Yellow),
        latency_cell(stats.avg),
        latency_cell(stats.p50),
        latency_cell(stats.p90),
        latency_cell(stats.p99),
        latency_cell(stats.max),
    ]
}

fn count_cell(count: usize, color: Color) -> Cell {
    let cell = Cell::new(count).set_alignment(CellAlignment::Right);
    if count > 0 { cell.fg(color) } else { cell }
}

fn latency_cell(latency: Duration) -> Cell {
    Cell::new(format!("{}ms", latency.as_millis())).set_alignment(CellAlignment::Right)
}
