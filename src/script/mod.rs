//! 脚本沙箱
//!
//! 前置脚本与后置脚本通过 [`ScriptEngine`] 端口求值。引擎只能读取传入的
//! [`ScriptContext`]，所有效果通过 [`ScriptOutput`] 返回；运行器不向脚本
//! 提供文件系统或网络访问。求值是同步的。

pub mod bindings;
mod engine;

pub use engine::ExprScriptEngine;

use crate::assertion::AssertionResult;
use crate::http::{ResolvedRequest, Response};
use crate::variable::VariableContext;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptPhase {
    PreRequest,
    PostResponse,
}

/// 脚本可读取的内容
#[derive(Debug, Clone, Copy)]
pub struct ScriptContext<'a> {
    pub phase: ScriptPhase,
    pub request: &'a ResolvedRequest,
    pub response: Option<&'a Response>,
    pub variables: &'a VariableContext,
    pub iteration: usize,
    pub pass: usize,
}

/// 脚本产生的效果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptOutput {
    /// 修改后的请求（仅前置脚本）
    pub request: Option<ResolvedRequest>,
    /// 脚本设置的变量，按设置顺序
    pub variables: Vec<(String, String)>,
    /// 每个 test / assert 一条
    pub assertions: Vec<AssertionResult>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("line {line}: syntax error: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: {message}")]
    Evaluation { line: usize, message: String },

    #[error("line {line}: script threw: {message}")]
    Thrown { line: usize, message: String },
}

/// 脚本中途出错；`partial` 为出错前已产生的效果
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{error}")]
pub struct ScriptAbort {
    pub error: ScriptError,
    pub partial: ScriptOutput,
}

impl From<ScriptError> for ScriptAbort {
    fn from(error: ScriptError) -> Self {
        Self {
            error,
            partial: ScriptOutput::default(),
        }
    }
}

pub trait ScriptEngine: Send + Sync {
    fn evaluate(
        &self,
        source: &str,
        context: &ScriptContext<'_>,
    ) -> Result<ScriptOutput, ScriptAbort>;
}

/// 运行脚本；出错时保留已产生的效果，并追加一条失败记录
pub fn run_script(
    engine: &dyn ScriptEngine,
    source: &str,
    context: &ScriptContext<'_>,
) -> ScriptOutput {
    match engine.evaluate(source, context) {
        Ok(output) => output,
        Err(ScriptAbort { error, partial }) => {
            let name = match context.phase {
                ScriptPhase::PreRequest => "pre-request script",
                ScriptPhase::PostResponse => "post-response script",
            };
            tracing::debug!(phase = name, "Script error: {}", error);
            let mut output = partial;
            output
                .assertions
                .push(AssertionResult::script(name, false, Some(error.to_string())));
            output
        }
    }
}
