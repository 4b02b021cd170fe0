use crate::assertion::AssertionResult;
use crate::http::ResolvedRequest;
use crate::script::bindings::{self, bind, ident, is_truthy, value_to_string};
use crate::script::{
    ScriptAbort, ScriptContext, ScriptEngine, ScriptError, ScriptOutput, ScriptPhase,
};
use crate::variable::VariableContext;
use evalexpr::{
    ContextWithMutableFunctions, EvalexprError, Function, HashMapContext, Value, eval_with_context,
};

/// 内置脚本引擎：每行一条语句，表达式由 evalexpr 求值
///
/// ```text
/// # 注释
/// set token = response.body.token
/// header X-Trace-Id = uuid()
/// param page = var("page")
/// remove header Authorization
/// test "status is ok" => response.status == 200
/// assert response.time < 500
/// throw "unexpected state"
/// ```
///
/// 可用标识符：`vars.*`、`request.*`、`response.*`、`iteration`、`pass`；
/// 函数：`uuid()`、`timestamp()`、`var("name")`。
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprScriptEngine;

impl ExprScriptEngine {
    pub fn new() -> Self {
        Self
    }
}

enum Statement<'a> {
    Set { name: &'a str, expr: &'a str },
    Header { name: &'a str, expr: &'a str },
    Param { name: &'a str, expr: &'a str },
    RemoveHeader(&'a str),
    RemoveParam(&'a str),
    Test { name: String, expr: &'a str },
    Assert(&'a str),
    Throw(&'a str),
}

fn parse_statement(line: &str, number: usize) -> Result<Statement<'_>, ScriptError> {
    let syntax = |message: String| ScriptError::Syntax {
        line: number,
        message,
    };
    let (keyword, rest) = line
        .split_once(char::is_whitespace)
        .map(|(k, r)| (k, r.trim()))
        .unwrap_or((line, ""));

    match keyword {
        "set" => {
            assignment(keyword, rest, number).map(|(name, expr)| Statement::Set { name, expr })
        }
        "header" => {
            assignment(keyword, rest, number).map(|(name, expr)| Statement::Header { name, expr })
        }
        "param" => {
            assignment(keyword, rest, number).map(|(name, expr)| Statement::Param { name, expr })
        }
        "remove" => match rest.split_once(char::is_whitespace) {
            Some(("header", name)) if !name.trim().is_empty() => {
                Ok(Statement::RemoveHeader(name.trim()))
            }
            Some(("param", name)) if !name.trim().is_empty() => {
                Ok(Statement::RemoveParam(name.trim()))
            }
            _ => Err(syntax("expected `remove header|param <name>`".to_string())),
        },
        "test" => {
            let quote = rest
                .chars()
                .next()
                .filter(|c| *c == '"' || *c == '\'')
                .ok_or_else(|| syntax("test name must be quoted".to_string()))?;
            let close = rest[1..]
                .find(quote)
                .ok_or_else(|| syntax("unterminated test name".to_string()))?;
            let name = rest[1..1 + close].to_string();
            let expr = rest[close + 2..]
                .trim()
                .strip_prefix("=>")
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .ok_or_else(|| syntax("expected `test \"name\" => <expr>`".to_string()))?;
            Ok(Statement::Test { name, expr })
        }
        "assert" if !rest.is_empty() => Ok(Statement::Assert(rest)),
        "throw" if !rest.is_empty() => Ok(Statement::Throw(rest)),
        other => Err(syntax(format!("unknown statement `{}`", other))),
    }
}

/// `<name> = <expr>`
fn assignment<'a>(
    keyword: &str,
    rest: &'a str,
    number: usize,
) -> Result<(&'a str, &'a str), ScriptError> {
    let syntax = |message: String| ScriptError::Syntax {
        line: number,
        message,
    };
    let (name, expr) = rest
        .split_once('=')
        .ok_or_else(|| syntax(format!("expected `{} <name> = <expr>`", keyword)))?;
    let (name, expr) = (name.trim(), expr.trim());
    if name.is_empty() || name.contains(char::is_whitespace) || expr.is_empty() {
        return Err(syntax(format!("malformed `{}` statement", keyword)));
    }
    Ok((name, expr))
}

fn build_context(
    context: &ScriptContext<'_>,
    request: &ResolvedRequest,
    variables: &VariableContext,
) -> HashMapContext {
    let mut ctx = HashMapContext::new();

    bind(&mut ctx, "iteration".to_string(), Value::Int(context.iteration as i64));
    bind(&mut ctx, "pass".to_string(), Value::Int(context.pass as i64));
    bindings::bind_variables(&mut ctx, variables);

    bind(
        &mut ctx,
        "request.method".to_string(),
        Value::String(request.method.to_string()),
    );
    bind(
        &mut ctx,
        "request.url".to_string(),
        Value::String(request.url.clone()),
    );
    bind(
        &mut ctx,
        "request.body".to_string(),
        Value::String(request.body.clone().unwrap_or_default()),
    );
    for (name, value) in &request.headers {
        bind(
            &mut ctx,
            format!("request.headers.{}", ident(&name.to_ascii_lowercase())),
            Value::String(value.clone()),
        );
    }
    for (name, value) in &request.query {
        bind(
            &mut ctx,
            format!("request.query.{}", ident(name)),
            Value::String(value.clone()),
        );
    }

    if let Some(response) = context.response {
        bindings::bind_response(&mut ctx, "response", response);
    }

    let functions = [
        (
            "uuid",
            Function::new(|_| Ok(Value::String(uuid::Uuid::new_v4().to_string()))),
        ),
        (
            "timestamp",
            Function::new(|_| Ok(Value::Int(chrono::Utc::now().timestamp()))),
        ),
    ];
    for (name, function) in functions {
        let _ = ctx.set_function(name.to_string(), function);
    }

    let snapshot = variables.clone();
    let _ = ctx.set_function(
        "var".to_string(),
        Function::new(move |argument| {
            let key = argument.as_string()?;
            Ok(snapshot
                .get(&key)
                .map(|v| Value::String(v.to_string()))
                .unwrap_or(Value::Empty))
        }),
    );

    ctx
}

impl ScriptEngine for ExprScriptEngine {
    fn evaluate(
        &self,
        source: &str,
        context: &ScriptContext<'_>,
    ) -> Result<ScriptOutput, ScriptAbort> {
        let mut request = context.request.clone();
        let mut output = ScriptOutput::default();
        let mut request_changed = false;

        let executed = execute_lines(
            source,
            context,
            &mut request,
            &mut request_changed,
            &mut output,
        );
        if request_changed {
            output.request = Some(request);
        }
        match executed {
            Ok(()) => Ok(output),
            Err(error) => Err(ScriptAbort {
                error,
                partial: output,
            }),
        }
    }
}

/// 逐行执行；出错时 `output` 保留出错前的测试与变量
fn execute_lines(
    source: &str,
    context: &ScriptContext<'_>,
    request: &mut ResolvedRequest,
    request_changed: &mut bool,
    output: &mut ScriptOutput,
) -> Result<(), ScriptError> {
    let mut variables = context.variables.clone();
    let mut ctx = build_context(context, request, &variables);

    for (index, raw) in source.lines().enumerate() {
        let number = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }

        let eval = |ctx: &HashMapContext, expr: &str| -> Result<Value, ScriptError> {
            eval_with_context(expr, ctx).map_err(|e: EvalexprError| ScriptError::Evaluation {
                line: number,
                message: e.to_string(),
            })
        };
        let pre_only = |what: &str| -> Result<(), ScriptError> {
            if context.phase == ScriptPhase::PreRequest {
                Ok(())
            } else {
                Err(ScriptError::Evaluation {
                    line: number,
                    message: format!("{} is only available in pre-request scripts", what),
                })
            }
        };

        match parse_statement(line, number)? {
            Statement::Set { name, expr } => {
                let value = value_to_string(&eval(&ctx, expr)?);
                variables.insert(name, value.clone());
                output.variables.push((name.to_string(), value));
                ctx = build_context(context, request, &variables);
            }
            Statement::Header { name, expr } => {
                pre_only("header")?;
                let value = value_to_string(&eval(&ctx, expr)?);
                request.set_header(name, &value);
                *request_changed = true;
                ctx = build_context(context, request, &variables);
            }
            Statement::Param { name, expr } => {
                pre_only("param")?;
                let value = value_to_string(&eval(&ctx, expr)?);
                request.set_query(name, &value);
                *request_changed = true;
                ctx = build_context(context, request, &variables);
            }
            Statement::RemoveHeader(name) => {
                pre_only("remove header")?;
                *request_changed |= request.remove_header(name);
                ctx = build_context(context, request, &variables);
            }
            Statement::RemoveParam(name) => {
                pre_only("remove param")?;
                let before = request.query.len();
                request.query.retain(|(k, _)| k != name);
                *request_changed |= before != request.query.len();
                ctx = build_context(context, request, &variables);
            }
            Statement::Test { name, expr } => {
                output.assertions.push(check(name, expr, &ctx));
            }
            Statement::Assert(expr) => {
                output.assertions.push(check(expr.to_string(), expr, &ctx));
            }
            Statement::Throw(expr) => {
                let message = eval(&ctx, expr)
                    .map(|v| value_to_string(&v))
                    .unwrap_or_else(|_| expr.to_string());
                return Err(ScriptError::Thrown {
                    line: number,
                    message,
                });
            }
        }
    }

    Ok(())
}

/// 检查失败或出错只影响它自己那一条
fn check(name: String, expr: &str, ctx: &HashMapContext) -> AssertionResult {
    match eval_with_context(expr, ctx) {
        Ok(value) if is_truthy(&value) => AssertionResult::script(name, true, None),
        Ok(value) => AssertionResult::script(
            name,
            false,
            Some(format!("`{}` evaluated to {}", expr, value)),
        ),
        Err(e) => AssertionResult::script(name, false, Some(e.to_string())),
    }
}
