use crate::variable::types::VariableContext;
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// 变量替换器
pub struct VariableResolver;

impl VariableResolver {
    /// 替换文本中的所有 {{variable}} 占位符
    ///
    /// 内置动态变量：`{{$uuid}}`、`{{$timestamp}}`（Unix 秒）。
    /// 未定义的变量保持原样。
    pub fn substitute(text: &str, context: &VariableContext) -> String {
        static VAR_REGEX: OnceLock<Regex> = OnceLock::new();
        let re = VAR_REGEX.get_or_init(|| {
            Regex::new(r"\{\{\s*(\$?[a-zA-Z_][a-zA-Z0-9_.\-]*)\s*\}\}").unwrap()
        });

        re.replace_all(text, |caps: &Captures| {
            let var_name = &caps[1];
            match var_name {
                "$uuid" | "$guid" => uuid::Uuid::new_v4().to_string(),
                "$timestamp" => chrono::Utc::now().timestamp().to_string(),
                _ => context.get(var_name).unwrap_or(&caps[0]).to_string(),
            }
        })
        .to_string()
    }

    /// 解析并替换系统环境变量 ${VAR}
    pub fn resolve_env_vars(text: &str) -> String {
        static ENV_REGEX: OnceLock<Regex> = OnceLock::new();
        let re = ENV_REGEX.get_or_init(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

        re.replace_all(text, |caps: &Captures| {
            let env_name = &caps[1];
            std::env::var(env_name).unwrap_or_else(|_| caps[0].to_string())
        })
        .to_string()
    }

    /// 列出文本中尚未解析的变量名
    pub fn unresolved(text: &str) -> Vec<String> {
        static LEFTOVER_REGEX: OnceLock<Regex> = OnceLock::new();
        let re = LEFTOVER_REGEX
            .get_or_init(|| Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_.\-]*)\s*\}\}").unwrap());
        re.captures_iter(text).map(|c| c[1].to_string()).collect()
    }
}
