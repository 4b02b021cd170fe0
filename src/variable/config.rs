use crate::Result;
use crate::variable::resolver::VariableResolver;
use crate::variable::types::{RunpostConfig, VariableContext};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 配置文件加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 配置文件名
    const CONFIG_FILE: &'static str = "runpost.toml";

    /// 从指定路径加载配置文件
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<RunpostConfig> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: RunpostConfig = toml::from_str(&content)?;
        debug!(path = %path.as_ref().display(), "Config loaded");
        Ok(config)
    }

    /// 查找并加载配置文件
    /// 查找顺序：
    /// 1. 当前目录及其父目录
    /// 2. 用户配置目录 ~/.config/runpost/
    pub fn find_and_load() -> Option<RunpostConfig> {
        let path = Self::locate()?;
        match Self::load_from_path(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(path = %path.display(), "Ignoring unreadable config: {}", e);
                None
            }
        }
    }

    fn locate() -> Option<PathBuf> {
        if let Ok(mut current) = std::env::current_dir() {
            loop {
                let candidate = current.join(Self::CONFIG_FILE);
                if candidate.exists() {
                    return Some(candidate);
                }
                if !current.pop() {
                    break;
                }
            }
        }

        let home = dirs::home_dir()?;
        let candidate = home.join(".config").join("runpost").join(Self::CONFIG_FILE);
        candidate.exists().then_some(candidate)
    }

    /// 构建变量上下文
    ///
    /// 优先级（低 -> 高）：集合变量、环境变量、CLI 覆盖（--var key=value）。
    /// 数据集行与脚本写入的变量在运行期叠加在此之上。
    pub fn build_context(
        collection_vars: &HashMap<String, String>,
        config: &RunpostConfig,
        env_name: Option<&str>,
        cli_vars: &[(String, String)],
    ) -> VariableContext {
        let mut context = VariableContext::new();

        context.extend(collection_vars.iter().map(|(k, v)| (k.clone(), v.clone())));

        if let Some(name) = env_name {
            match config.get_environment(name) {
                Some(env) => {
                    for (key, value) in &env.variables {
                        context.insert(key.clone(), VariableResolver::resolve_env_vars(value));
                    }
                }
                None => warn!(environment = name, "Environment not found in config"),
            }
        }

        for (key, value) in cli_vars {
            context.insert(key.clone(), value.clone());
        }

        context
    }

    /// 解析 CLI 变量参数 "key=value"
    pub fn parse_cli_var(s: &str) -> Option<(String, String)> {
        s.split_once('=')
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
    }
}
