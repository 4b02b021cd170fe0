//! 运行条件
//!
//! 条件是一个 evalexpr 表达式，在请求启动前求值。可用标识符：
//!
//! - `iteration`、`pass`
//! - `row.<列名>`：当前数据集行
//! - `vars.<名称>`：本轮已解析的变量
//! - `deps.<名称或 ID>.{skipped,passed,failed,cancelled,status,duration,error}`
//!   与 `deps.<名称或 ID>.response.{status,time,body[.path],headers.<名称>}`：
//!   同一轮次内的直接依赖
//! - `results.<名称或 ID>.*`：结构同上，为目前已结束的每个请求的最新结果

use crate::collection::SavedRequest;
use crate::dataset::DataRow;
use crate::runner::types::RunnerRequestResult;
use crate::script::bindings::{self, bind, ident, is_truthy};
use crate::variable::VariableContext;
use evalexpr::{HashMapContext, Value, eval_with_context};
use regex::Regex;
use std::sync::OnceLock;

pub struct ConditionScope<'a> {
    pub iteration: usize,
    pub pass: usize,
    pub row: &'a DataRow,
    pub variables: &'a VariableContext,
    /// 请求的直接依赖及其本轮结果
    pub dependencies: Vec<(&'a SavedRequest, &'a RunnerRequestResult)>,
    pub results: &'a [RunnerRequestResult],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Run,
    Skip(String),
}

/// 决定请求在本轮是否执行
///
/// 依赖被跳过或失败时跳过该请求；除非请求自身的条件读取了依赖状态
/// （`deps.X.skipped`、`deps.X.failed` 等）且求值为真。
pub fn decide(request: &SavedRequest, scope: &ConditionScope<'_>) -> Decision {
    let condition = request
        .condition
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let upstream = scope.dependencies.iter().find_map(|(dep, result)| {
        if result.skipped {
            Some(format!("dependency '{}' was skipped", dep.name))
        } else if result.failed() {
            Some(format!("dependency '{}' failed", dep.name))
        } else {
            None
        }
    });

    match (condition, upstream) {
        (None, None) => Decision::Run,
        (None, Some(reason)) => Decision::Skip(reason),
        (Some(expr), Some(reason)) if !inspects_dependency_state(expr) => Decision::Skip(reason),
        (Some(expr), _) => match evaluate(expr, scope) {
            Ok(true) => Decision::Run,
            Ok(false) => Decision::Skip(format!("condition `{}` evaluated false", expr)),
            Err(e) => Decision::Skip(format!("condition `{}` failed: {}", expr, e)),
        },
    }
}

pub fn evaluate(expr: &str, scope: &ConditionScope<'_>) -> Result<bool, String> {
    let ctx = build_context(scope);
    eval_with_context(expr, &ctx)
        .map(|value| is_truthy(&value))
        .map_err(|e| e.to_string())
}

fn inspects_dependency_state(expr: &str) -> bool {
    static STATE_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = STATE_REGEX.get_or_init(|| {
        Regex::new(r"deps\.\w+\.(skipped|failed|passed|cancelled)\b").unwrap()
    });
    re.is_match(expr)
}

fn build_context(scope: &ConditionScope<'_>) -> HashMapContext {
    let mut ctx = HashMapContext::new();

    bind(
        &mut ctx,
        "iteration".to_string(),
        Value::Int(scope.iteration as i64),
    );
    bind(&mut ctx, "pass".to_string(), Value::Int(scope.pass as i64));
    for (key, value) in scope.row {
        bindings::bind_json(&mut ctx, &format!("row.{}", ident(key)), value);
    }
    bindings::bind_variables(&mut ctx, scope.variables);

    for (request, result) in &scope.dependencies {
        bind_result(&mut ctx, &format!("deps.{}", ident(&request.name)), result);
        bind_result(&mut ctx, &format!("deps.{}", ident(&request.id)), result);
    }

    // 先绑定者优先：最新结果排在前面
    let mut settled: Vec<&RunnerRequestResult> = scope
        .results
        .iter()
        .filter(|r| r.chaos_case.is_none())
        .collect();
    settled.sort_by(|a, b| b.sequence.cmp(&a.sequence));
    for result in settled {
        bind_result(&mut ctx, &format!("results.{}", ident(&result.name)), result);
        bind_result(
            &mut ctx,
            &format!("results.{}", ident(&result.request_id)),
            result,
        );
    }

    ctx
}

fn bind_result(ctx: &mut HashMapContext, prefix: &str, result: &RunnerRequestResult) {
    let flag = |name: &str| format!("{}.{}", prefix, name);
    bind(ctx, flag("skipped"), Value::Boolean(result.skipped));
    bind(ctx, flag("cancelled"), Value::Boolean(result.cancelled));
    bind(ctx, flag("passed"), Value::Boolean(!result.skipped && result.passed));
    bind(ctx, flag("failed"), Value::Boolean(result.failed()));
    bind(
        ctx,
        flag("duration"),
        Value::Float(result.duration.as_secs_f64() * 1000.0),
    );
    if let Some(error) = &result.error {
        bind(ctx, flag("error"), Value::String(error.clone()));
    }
    if let Some(response) = &result.response {
        bind(ctx, flag("status"), Value::Int(response.status.code() as i64));
        bindings::bind_response(ctx, &flag("response"), response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Response;
    use crate::runner::types::ResultMeta;
    use chrono::Utc;
    use std::time::Duration;

    fn meta(sequence: usize, id: &str, name: &str) -> ResultMeta {
        ResultMeta {
            sequence,
            request_id: id.to_string(),
            name: name.to_string(),
            method: "GET".to_string(),
            ..ResultMeta::default()
        }
    }

    fn completed(sequence: usize, id: &str, name: &str, status: u16) -> RunnerRequestResult {
        let response = Response::new(
            status,
            [("Content-Type", "application/json")],
            r#"{"token": "abc", "count": 2}"#.to_string(),
            Duration::from_millis(12),
        )
        .unwrap();
        RunnerRequestResult::completed(meta(sequence, id, name), Utc::now(), response, Vec::new())
    }

    struct Fixture {
        row: DataRow,
        variables: VariableContext,
    }

    impl Fixture {
        fn new() -> Self {
            let row: DataRow =
                serde_json::from_str(r#"{"user": "alice", "limit": 3, "vip": true}"#).unwrap();
            let mut variables = VariableContext::new();
            variables.insert("env", "staging");
            Self { row, variables }
        }

        fn scope<'a>(
            &'a self,
            dependencies: Vec<(&'a SavedRequest, &'a RunnerRequestResult)>,
            results: &'a [RunnerRequestResult],
        ) -> ConditionScope<'a> {
            ConditionScope {
                iteration: 1,
                pass: 4,
                row: &self.row,
                variables: &self.variables,
                dependencies,
                results,
            }
        }
    }

    #[test]
    fn test_row_iteration_and_vars() {
        let fixture = Fixture::new();
        let scope = fixture.scope(Vec::new(), &[]);
        for expr in [
            "row.user == \"alice\"",
            "row.limit > 2 && row.vip",
            "iteration == 1 && pass == 4",
            "vars.env == \"staging\"",
        ] {
            assert_eq!(evaluate(expr, &scope), Ok(true), "{}", expr);
        }
        assert!(evaluate("row.missing == 1", &scope).is_err());
    }

    #[test]
    fn test_dependency_response_by_name_and_id() {
        let fixture = Fixture::new();
        let login = SavedRequest::new("req-login", "Log In", "http://x/login");
        let result = completed(0, "req-login", "Log In", 200);
        let scope = fixture.scope(vec![(&login, &result)], &[]);

        assert_eq!(evaluate("deps.Log_In.response.status == 200", &scope), Ok(true));
        assert_eq!(evaluate("deps.req_login.status == 200", &scope), Ok(true));
        assert_eq!(
            evaluate("deps.Log_In.response.body.token == \"abc\"", &scope),
            Ok(true)
        );
        assert_eq!(evaluate("deps.Log_In.passed", &scope), Ok(true));
    }

    #[test]
    fn test_unicode_request_names() {
        let fixture = Fixture::new();
        let login = SavedRequest::new("login", "登录", "http://x/login");
        let signup = SavedRequest::new("signup", "注册", "http://x/signup");
        let login_result = completed(0, "login", "登录", 200);
        let signup_result = completed(1, "signup", "注册", 404);
        let scope = fixture.scope(
            vec![(&login, &login_result), (&signup, &signup_result)],
            &[],
        );

        assert_eq!(evaluate("deps.登录.status == 200", &scope), Ok(true));
        assert_eq!(evaluate("deps.注册.status == 404", &scope), Ok(true));

        let skipped = RunnerRequestResult::skipped(meta(0, "login", "登录"), "condition false");
        let scope = fixture.scope(vec![(&login, &skipped)], &[]);
        let fallback = SavedRequest::new("next", "下一步", "http://x/next")
            .depends_on("login")
            .with_condition("deps.登录.skipped");
        assert_eq!(decide(&fallback, &scope), Decision::Run);
    }

    #[test]
    fn test_condition_false_or_error_skips() {
        let fixture = Fixture::new();
        let scope = fixture.scope(Vec::new(), &[]);

        let request = SavedRequest::new("b", "B", "http://x/b").with_condition("row.limit > 10");
        assert!(matches!(decide(&request, &scope), Decision::Skip(_)));

        let request = SavedRequest::new("b", "B", "http://x/b").with_condition("nope +");
        assert!(matches!(decide(&request, &scope), Decision::Skip(_)));

        let request = SavedRequest::new("b", "B", "http://x/b").with_condition("  ");
        assert_eq!(decide(&request, &scope), Decision::Run);
    }

    #[test]
    fn test_failed_dependency_status_condition() {
        let fixture = Fixture::new();
        let a = SavedRequest::new("a", "A", "http://x/a");
        let a_result = completed(0, "a", "A", 500);
        let b = SavedRequest::new("b", "B", "http://x/b")
            .depends_on("A")
            .with_condition("deps.A.response.status == 200");

        let scope = fixture.scope(vec![(&a, &a_result)], &[]);
        assert!(matches!(decide(&b, &scope), Decision::Skip(_)));
    }

    #[test]
    fn test_skip_propagates_without_state_inspection() {
        let fixture = Fixture::new();
        let a = SavedRequest::new("a", "A", "http://x/a");
        let skipped = RunnerRequestResult::skipped(meta(0, "a", "A"), "condition evaluated false");

        let plain = SavedRequest::new("b", "B", "http://x/b").depends_on("a");
        let scope = fixture.scope(vec![(&a, &skipped)], &[]);
        assert_eq!(
            decide(&plain, &scope),
            Decision::Skip("dependency 'A' was skipped".to_string())
        );

        let unrelated = plain.clone().with_condition("true");
        assert!(matches!(decide(&unrelated, &scope), Decision::Skip(_)));

        let fallback = plain.clone().with_condition("deps.A.skipped");
        assert_eq!(decide(&fallback, &scope), Decision::Run);
    }

    #[test]
    fn test_accumulated_results_latest_wins() {
        let fixture = Fixture::new();
        let results = vec![
            completed(0, "a", "A", 200),
            completed(3, "a", "A", 404),
            completed(1, "c", "C", 201),
        ];
        let scope = fixture.scope(Vec::new(), &results);
        assert_eq!(evaluate("results.A.status == 404", &scope), Ok(true));
        assert_eq!(evaluate("results.C.response.time > 0", &scope), Ok(true));
    }
}
