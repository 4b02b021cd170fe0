use crate::runner::options::RunnerOptions;
use serde::Deserialize;
use std::collections::HashMap;

/// 变量上下文，存储所有可用变量
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableContext {
    /// 变量映射表
    variables: HashMap<String, String>,
}

impl VariableContext {
    /// 创建新的空变量上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入变量（已存在则覆盖）
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// 获取变量值
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(|s| s.as_str())
    }

    /// 批量插入变量
    pub fn extend<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.insert(k, v);
        }
    }

    /// 合并一行数据集：JSON 字符串取原值，其余类型取 JSON 文本
    pub fn merge_row(&mut self, row: &serde_json::Map<String, serde_json::Value>) {
        for (key, value) in row {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            self.insert(key.clone(), text);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.variables.iter()
    }

    /// 变量数量
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// 环境配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Environment {
    /// 变量映射
    #[serde(flatten)]
    pub variables: HashMap<String, String>,
}

/// 完整的配置文件 runpost.toml
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RunpostConfig {
    /// 所有环境配置
    #[serde(default)]
    pub environments: HashMap<String, Environment>,

    /// 运行器默认选项
    #[serde(default)]
    pub runner: RunnerOptions,
}

impl RunpostConfig {
    /// 获取指定环境的变量
    pub fn get_environment(&self, env_name: &str) -> Option<&Environment> {
        self.environments.get(env_name)
    }
}
