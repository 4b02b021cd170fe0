use crate::assertion::{self, AssertionResult};
use crate::chaos::ChaosCase;
use crate::collection::{ApiKeyLocation, AuthConfig, SavedRequest};
use crate::http::{BasicCredentials, Method, ResolvedRequest};
use crate::recorder::Exchange;
use crate::runner::types::{ResultMeta, RunnerRequestResult};
use crate::script::{ScriptContext, ScriptEngine, ScriptPhase, run_script};
use crate::transport::{TransportError, TransportRegistry};
use crate::variable::{VariableContext, VariableResolver};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 单个 RunContext 的执行产物
#[derive(Debug)]
pub struct Execution {
    pub result: RunnerRequestResult,
    /// 实际发出并收到响应的请求（供流量录制）
    pub exchange: Option<Exchange>,
    /// 脚本设置的变量，作用于当前轮次
    pub variables: Vec<(String, String)>,
}

impl Execution {
    fn finished(result: RunnerRequestResult, variables: Vec<(String, String)>) -> Self {
        Self {
            result,
            exchange: None,
            variables,
        }
    }

    fn cancelled(meta: ResultMeta) -> Self {
        Self::finished(RunnerRequestResult::cancelled(meta), Vec::new())
    }
}

/// 请求执行器
///
/// 一个上下文的完整流程：草稿请求 → 前置脚本 → 变量替换与认证 →
/// 混沌变换 → 传输 → 断言 → 后置脚本。所有失败都记录在结果中。
pub struct RequestExecutor {
    transports: TransportRegistry,
    scripts: Arc<dyn ScriptEngine>,
}

impl RequestExecutor {
    pub fn new(transports: TransportRegistry, scripts: Arc<dyn ScriptEngine>) -> Self {
        Self {
            transports,
            scripts,
        }
    }

    /// 执行单个上下文
    pub async fn execute(
        &self,
        saved: &SavedRequest,
        mut meta: ResultMeta,
        mut variables: VariableContext,
        chaos: Option<&ChaosCase>,
        cancel: &CancellationToken,
    ) -> Execution {
        // 已排队但尚未开始的上下文：取消后不再执行
        if cancel.is_cancelled() {
            return Execution::cancelled(meta);
        }

        let mut assertions: Vec<AssertionResult> = Vec::new();
        let mut script_vars: Vec<(String, String)> = Vec::new();

        let mut request = match draft(saved) {
            Ok(request) => request,
            Err(e) => {
                let result = RunnerRequestResult::error(
                    meta,
                    Utc::now(),
                    format!("Failed to build request: {}", e),
                    Duration::ZERO,
                    assertions,
                );
                return Execution::finished(result, script_vars);
            }
        };

        // 前置脚本：作用于未替换变量的草稿请求
        if let Some(source) = script_source(saved.pre_request_script.as_deref()) {
            let context = ScriptContext {
                phase: ScriptPhase::PreRequest,
                request: &request,
                response: None,
                variables: &variables,
                iteration: meta.iteration,
                pass: meta.pass,
            };
            let output = run_script(self.scripts.as_ref(), source, &context);
            if let Some(updated) = output.request {
                request = updated;
            }
            variables.extend(output.variables.iter().cloned());
            script_vars.extend(output.variables);
            assertions.extend(output.assertions);
            if cancel.is_cancelled() {
                return Execution::cancelled(meta);
            }
        }

        materialize(&mut request, &saved.auth, &variables);
        let latency = chaos.and_then(|case| case.apply(&mut request));
        meta.method = request.method.as_str().to_string();
        meta.url = request.full_url();

        let unresolved = VariableResolver::unresolved(&meta.url);
        if !unresolved.is_empty() {
            debug!(request = %meta.name, ?unresolved, "Unresolved variables in URL");
        }

        let started_at = Utc::now();
        let start = Instant::now();

        if let Some(delay) = latency {
            tokio::select! {
                _ = cancel.cancelled() => return Execution::cancelled(meta),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if cancel.is_cancelled() {
            return Execution::cancelled(meta);
        }

        debug!(
            sequence = meta.sequence,
            request = %meta.name,
            method = %meta.method,
            url = %meta.url,
            chaos = meta.chaos_case.as_deref().unwrap_or("-"),
            "Sending request"
        );

        let mut response = match self.transports.send(&request, cancel).await {
            Ok(response) => response,
            Err(TransportError::Cancelled) => return Execution::cancelled(meta),
            Err(e) => {
                debug!(request = %meta.name, "Transport error: {}", e);
                let result = RunnerRequestResult::error(
                    meta,
                    started_at,
                    e.to_string(),
                    start.elapsed(),
                    assertions,
                );
                return Execution::finished(result, script_vars);
            }
        };
        if let Some(delay) = latency {
            response.duration += delay;
        }

        assertions.extend(assertion::evaluate_all(&saved.assertions, &response));

        if let Some(source) = script_source(saved.post_response_script.as_deref()) {
            let context = ScriptContext {
                phase: ScriptPhase::PostResponse,
                request: &request,
                response: Some(&response),
                variables: &variables,
                iteration: meta.iteration,
                pass: meta.pass,
            };
            let output = run_script(self.scripts.as_ref(), source, &context);
            script_vars.extend(output.variables);
            assertions.extend(output.assertions);
        }

        let exchange = Exchange {
            sequence: meta.sequence,
            request_id: meta.request_id.clone(),
            name: meta.name.clone(),
            chaos_case: meta.chaos_case.clone(),
            request,
            response: response.clone(),
        };
        let result = RunnerRequestResult::completed(meta, started_at, response, assertions);
        debug!(
            sequence = result.sequence,
            status = ?result.status(),
            passed = result.passed,
            "Request settled"
        );

        Execution {
            result,
            exchange: Some(exchange),
            variables: script_vars,
        }
    }
}

fn script_source(source: Option<&str>) -> Option<&str> {
    source.filter(|s| !s.trim().is_empty())
}

/// 由保存的请求构造草稿（模板尚未替换，禁用项已剔除）
fn draft(saved: &SavedRequest) -> crate::Result<ResolvedRequest> {
    let method: Method = saved.method.parse()?;
    let mut request = ResolvedRequest::new(method, &saved.url);
    request.protocol = saved.protocol;
    request.headers = saved
        .headers
        .iter()
        .filter(|h| h.enabled)
        .map(|h| (h.key.clone(), h.value.clone()))
        .collect();
    request.query = saved
        .params
        .iter()
        .filter(|p| p.enabled)
        .map(|p| (p.key.clone(), p.value.clone()))
        .collect();
    request.body = saved.body.clone();
    request.timeout = saved.timeout_ms.map(Duration::from_millis);
    Ok(request)
}

/// 替换 {{变量}} 并注入认证信息
fn materialize(request: &mut ResolvedRequest, auth: &AuthConfig, variables: &VariableContext) {
    let substitute = |text: &str| VariableResolver::substitute(text, variables);

    request.url = substitute(&request.url);
    for (key, value) in request.headers.iter_mut().chain(request.query.iter_mut()) {
        *key = substitute(key);
        *value = substitute(value);
    }
    request.body = request.body.as_deref().map(substitute);

    match auth {
        AuthConfig::None => {}
        AuthConfig::Bearer { token } => {
            let value = format!("Bearer {}", substitute(token));
            request.set_header("Authorization", &value);
        }
        AuthConfig::Basic { username, password } => {
            request.basic_auth = Some(BasicCredentials {
                username: substitute(username),
                password: (!password.is_empty()).then(|| substitute(password)),
            });
        }
        AuthConfig::ApiKey {
            key,
            value,
            location,
        } => {
            let (key, value) = (substitute(key), substitute(value));
            match location {
                ApiKeyLocation::Header => request.set_header(&key, &value),
                ApiKeyLocation::Query => request.set_query(&key, &value),
            }
        }
    }
}
