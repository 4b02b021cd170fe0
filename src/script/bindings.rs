//! 运行条件与脚本共用的 evalexpr 绑定
//!
//! 标识符是点分路径（`response.body.user.id`）。字母、数字（含中文等
//! Unicode 字符）与 `_` 原样保留，其余字符替换为 `_`，因此 header
//! `content-type` 对应 `response.headers.content_type`，请求名 `登录` 对应 `deps.登录`。

use crate::http::Response;
use crate::variable::VariableContext;
use evalexpr::{Context, ContextWithMutableVariables, HashMapContext, Value};
use tracing::debug;

const MAX_JSON_DEPTH: usize = 16;

pub fn ident(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// 绑定一个值；标识符已存在时跳过
pub fn bind(ctx: &mut HashMapContext, name: String, value: Value) {
    if ctx.get_value(&name).is_some() {
        return;
    }
    if let Err(e) = ctx.set_value(name.clone(), value) {
        debug!(identifier = %name, "Skipping binding: {}", e);
    }
}

/// JSON 标量转为 evalexpr 值；整数保持整数，`== 200` 才能匹配
pub fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Empty,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

/// 绑定 `prefix` 本身，以及每个嵌套字段 `prefix.field`
pub fn bind_json(ctx: &mut HashMapContext, prefix: &str, value: &serde_json::Value) {
    walk_json(ctx, prefix, value, 0);
}

fn walk_json(ctx: &mut HashMapContext, prefix: &str, value: &serde_json::Value, depth: usize) {
    bind(ctx, prefix.to_string(), json_to_value(value));
    if depth >= MAX_JSON_DEPTH {
        return;
    }
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                walk_json(ctx, &format!("{}.{}", prefix, ident(key)), child, depth + 1);
            }
        }
        serde_json::Value::Array(items) => {
            bind(ctx, format!("{}.length", prefix), Value::Int(items.len() as i64));
            for (index, child) in items.iter().enumerate() {
                walk_json(ctx, &format!("{}.{}", prefix, index), child, depth + 1);
            }
        }
        _ => {}
    }
}

/// 绑定 `prefix.status`、`prefix.time`、`prefix.body[.path]` 与 `prefix.headers.name`
pub fn bind_response(ctx: &mut HashMapContext, prefix: &str, response: &Response) {
    bind(
        ctx,
        format!("{}.status", prefix),
        Value::Int(response.status.code() as i64),
    );
    bind(
        ctx,
        format!("{}.time", prefix),
        Value::Float(response.duration.as_secs_f64() * 1000.0),
    );
    for (name, value) in &response.headers {
        bind(
            ctx,
            format!("{}.headers.{}", prefix, ident(name)),
            Value::String(value.clone()),
        );
    }
    let body_prefix = format!("{}.body", prefix);
    bind(ctx, body_prefix.clone(), Value::String(response.body.clone()));
    if let Some(json) = response.json() {
        walk_json(ctx, &body_prefix, &json, 0);
    }
}

/// 变量以字符串形式绑定在 `vars.` 下
pub fn bind_variables(ctx: &mut HashMapContext, variables: &VariableContext) {
    for (key, value) in variables.iter() {
        bind(
            ctx,
            format!("vars.{}", ident(key)),
            Value::String(value.clone()),
        );
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Boolean(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0 && !f.is_nan(),
        Value::String(s) => !s.is_empty(),
        Value::Tuple(items) => !items.is_empty(),
        Value::Empty => false,
    }
}

/// 值的纯文本形式（字符串不带引号）
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Empty => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalexpr::eval_with_context;
    use std::time::Duration;

    #[test]
    fn test_ident_sanitizes() {
        assert_eq!(ident("content-type"), "content_type");
        assert_eq!(ident("Get User"), "Get_User");
        assert_eq!(ident("user_id2"), "user_id2");
        assert_eq!(ident("登录"), "登录");
        assert_ne!(ident("登录"), ident("注册"));
        assert_eq!(ident("获取 用户"), "获取_用户");
    }

    #[test]
    fn test_response_bindings() {
        let response = Response::new(
            200,
            [("X-Request-Id", "abc")],
            r#"{"user": {"id": 7, "roles": ["admin"]}, "score": 1.5}"#.to_string(),
            Duration::from_millis(40),
        )
        .unwrap();

        let mut ctx = HashMapContext::new();
        bind_response(&mut ctx, "response", &response);

        let eval = |expr: &str| eval_with_context(expr, &ctx).unwrap();
        assert_eq!(eval("response.status == 200"), Value::Boolean(true));
        assert_eq!(eval("response.body.user.id == 7"), Value::Boolean(true));
        assert_eq!(eval("response.body.user.roles.0"), Value::String("admin".into()));
        assert_eq!(eval("response.body.user.roles.length"), Value::Int(1));
        assert_eq!(eval("response.body.score > 1"), Value::Boolean(true));
        assert_eq!(
            eval("response.headers.x_request_id"),
            Value::String("abc".into())
        );
        assert_eq!(eval("response.time < 1000"), Value::Boolean(true));
    }

    #[test]
    fn test_first_binding_wins() {
        let mut ctx = HashMapContext::new();
        bind(&mut ctx, "a".to_string(), Value::Int(1));
        bind(&mut ctx, "a".to_string(), Value::String("x".into()));
        assert_eq!(ctx.get_value("a"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&Value::Boolean(true)));
        assert!(!is_truthy(&Value::Int(0)));
        assert!(!is_truthy(&Value::String(String::new())));
        assert!(!is_truthy(&Value::Empty));
        assert_eq!(value_to_string(&Value::String("x".into())), "x");
        assert_eq!(value_to_string(&Value::Int(3)), "3");
    }
}
