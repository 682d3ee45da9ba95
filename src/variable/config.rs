use crate::variable::resolver::TemplateResolver;
use crate::{Result, RuloadError};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// 环境配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Environment {
    /// 变量映射
    #[serde(flatten)]
    pub variables: HashMap<String, String>,
}

/// `ruload.toml`：按环境覆盖场景全局变量
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EnvironmentConfig {
    /// 所有环境配置
    #[serde(default)]
    pub environments: HashMap<String, Environment>,
}

impl EnvironmentConfig {
    /// 获取指定环境的变量
    pub fn get_environment(&self, env_name: &str) -> Option<&Environment> {
        self.environments.get(env_name)
    }
}

/// 环境配置文件加载器
pub struct EnvironmentLoader;

impl EnvironmentLoader {
    /// 配置文件名
    const CONFIG_FILE: &'static str = "ruload.toml";

    /// 从指定路径加载配置文件
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<EnvironmentConfig> {
        let content = fs::read_to_string(path.as_ref())?;

        toml::from_str(&content).map_err(|e| {
            RuloadError::Config(format!(
                "Failed to parse {}: {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    /// 查找并加载配置文件
    /// 查找顺序：
    /// 1. 当前目录及其父目录
    /// 2. 用户配置目录 ~/.config/ruload/
    pub fn find_and_load() -> Option<EnvironmentConfig> {
        Self::try_load_from_current_dir().or_else(Self::try_load_from_user_dir)
    }

    /// 尝试从当前目录及其父目录加载
    fn try_load_from_current_dir() -> Option<EnvironmentConfig> {
        let mut current = std::env::current_dir().ok()?;

        loop {
            let config_path = current.join(Self::CONFIG_FILE);
            if config_path.exists() {
                return Self::load_from_path(&config_path).ok();
            }

            if !current.pop() {
                break;
            }
        }

        None
    }

    /// 尝试从用户配置目录加载
    fn try_load_from_user_dir() -> Option<EnvironmentConfig> {
        let home = dirs::home_dir()?;
        let config_path = home.join(".config").join("ruload").join(Self::CONFIG_FILE);

        if config_path.exists() {
            Self::load_from_path(&config_path).ok()
        } else {
            None
        }
    }

    /// 计算全局变量覆盖
    /// env_name: 环境名称（如 "dev", "staging"）
    /// cli_vars: CLI 传入的变量覆盖（--var key=value），优先级最高
    pub fn build_overrides(
        config: Option<&EnvironmentConfig>,
        env_name: Option<&str>,
        cli_vars: &[(String, String)],
    ) -> Result<Vec<(String, String)>> {
        let mut overrides = Vec::new();

        if let Some(name) = env_name {
            let env = config.and_then(|c| c.get_environment(name)).ok_or_else(|| {
                RuloadError::Config(format!("Environment '{}' not found in ruload.toml", name))
            })?;

            let mut keys: Vec<_> = env.variables.keys().collect();
            keys.sort();
            for key in keys {
                // 解析系统环境变量 ${VAR}
                let resolved = TemplateResolver::resolve_env_vars(&env.variables[key]);
                overrides.push((key.clone(), resolved));
            }
        }

        overrides.extend(cli_vars.iter().cloned());
        Ok(overrides)
    }

    /// 解析 CLI 变量参数 "key=value"
    pub fn parse_cli_var(s: &str) -> Option<(String, String)> {
        s.split_once('=')
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
    }
}
