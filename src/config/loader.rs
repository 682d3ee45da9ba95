use crate::config::types::{ExecutionConfig, ReportingConfig, ScenarioConfig, ScenarioFile};
use crate::feeder::FeederSet;
use crate::runner::LoadProfile;
use crate::scenario::{Scenario, convert_scenario};
use crate::{Result, RuloadError};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// 一次执行：场景 + 负载配置
#[derive(Debug, Clone)]
pub struct Execution {
    pub scenario: Arc<Scenario>,
    pub profile: LoadProfile,
}

/// 报告设置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSettings {
    /// 控制台打印摘要
    pub final_stats: bool,
    /// 原始结果写入的 JSON Lines 文件
    pub dump_jsonl: Option<PathBuf>,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            final_stats: true,
            dump_jsonl: None,
        }
    }
}

/// 加载完成、可以运行的测试计划
#[derive(Debug, Clone)]
pub struct TestPlan {
    /// 场景文件路径
    pub source: PathBuf,
    pub executions: Vec<Execution>,
    pub report: ReportSettings,
}

/// 场景文件加载器
pub struct ScenarioLoader;

impl ScenarioLoader {
    /// 从文件加载；数据源的相对路径按场景文件所在目录解析
    pub fn load_from_path<P: AsRef<Path>>(path: P, overrides: &[(String, String)]) -> Result<TestPlan> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            RuloadError::Config(format!("Cannot read scenario file {}: {}", path.display(), e))
        })?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut plan = Self::load_from_str(&content, base_dir, overrides)?;
        plan.source = path.to_path_buf();
        Ok(plan)
    }

    /// 从字符串内容加载
    pub fn load_from_str(
        content: &str,
        base_dir: &Path,
        overrides: &[(String, String)],
    ) -> Result<TestPlan> {
        let file: ScenarioFile = serde_yaml::from_str(content)?;
        if file.scenarios.is_empty() {
            return Err(RuloadError::Config(
                "Scenario file defines no scenarios".to_string(),
            ));
        }

        let mut executions = file.execution.into_vec();
        if executions.is_empty() {
            executions.push(ExecutionConfig::default());
        }

        // 同名场景只构建一次，多个执行共享同一份数据源
        let mut built: HashMap<String, Arc<Scenario>> = HashMap::new();
        let mut plan_executions = Vec::with_capacity(executions.len());

        for execution in &executions {
            let name = scenario_name(execution, &file.scenarios)?;
            let scenario = match built.get(&name) {
                Some(scenario) => scenario.clone(),
                None => {
                    let config = &file.scenarios[&name];
                    let scenario = Arc::new(build_scenario(&name, config, base_dir, overrides)?);
                    built.insert(name.clone(), scenario.clone());
                    scenario
                }
            };

            plan_executions.push(Execution {
                scenario,
                profile: load_profile(execution)?,
            });
        }

        Ok(TestPlan {
            source: PathBuf::new(),
            executions: plan_executions,
            report: report_settings(&file.reporting, base_dir),
        })
    }
}

fn scenario_name(
    execution: &ExecutionConfig,
    scenarios: &std::collections::BTreeMap<String, ScenarioConfig>,
) -> Result<String> {
    match &execution.scenario {
        Some(name) if scenarios.contains_key(name) => Ok(name.clone()),
        Some(name) => Err(RuloadError::Config(format!(
            "Execution refers to unknown scenario '{}'",
            name
        ))),
        None if scenarios.len() == 1 => Ok(scenarios.keys().next().cloned().unwrap_or_default()),
        None => Err(RuloadError::Config(
            "Execution must name a scenario when several are defined".to_string(),
        )),
    }
}

fn build_scenario(
    name: &str,
    config: &ScenarioConfig,
    base_dir: &Path,
    overrides: &[(String, String)],
) -> Result<Scenario> {
    let mut scenario = convert_scenario(name, config, overrides)?;

    let sources = config
        .data_sources
        .iter()
        .map(|source| source.to_source(base_dir))
        .collect::<Result<Vec<_>>>()?;
    scenario.feeders = FeederSet::open_all(&sources)?;

    debug!(
        "Loaded scenario '{}': {} steps, {} data sources",
        name,
        scenario.steps.len(),
        scenario.feeders.len()
    );
    Ok(scenario)
}

fn load_profile(execution: &ExecutionConfig) -> Result<LoadProfile> {
    let concurrency = execution.concurrency.unwrap_or(1);
    if concurrency == 0 {
        return Err(RuloadError::Config(
            "concurrency must be at least 1".to_string(),
        ));
    }

    Ok(LoadProfile {
        concurrency,
        ramp_up: execution
            .ramp_up
            .as_ref()
            .map(|d| d.to_duration())
            .transpose()?
            .unwrap_or_default(),
        hold_for: execution
            .hold_for
            .as_ref()
            .map(|d| d.to_duration())
            .transpose()?,
        iterations: execution.iterations,
    })
}

fn report_settings(reporting: &[ReportingConfig], base_dir: &Path) -> ReportSettings {
    if reporting.is_empty() {
        return ReportSettings::default();
    }

    let mut settings = ReportSettings {
        final_stats: false,
        dump_jsonl: None,
    };
    for module in reporting {
        match module.module.as_str() {
            "final-stats" | "final_stats" => {
                settings.final_stats = true;
                if let Some(path) = &module.dump_jsonl {
                    settings.dump_jsonl = Some(base_dir.join(path));
                }
                if let Some(path) = &module.dump_xml {
                    warn!("Report format dump-xml is not supported, '{}' will not be written", path);
                }
            }
            other => warn!("Reporting module '{}' is not supported, ignored", other),
        }
    }
    settings
}
