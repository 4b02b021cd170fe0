use crate::assertion::types::{AssertError, AssertExpr, AssertValue, CompareOp, ValuePath};
use std::str::FromStr;

/// 解析一条声明式断言
///
/// ```text
/// status == 200
/// status in 200..299
/// headers.content-type contains "json"
/// body.items.0.id > 0
/// body.token exists
/// response.time < 1000
/// ```
pub fn parse_assertion(input: &str) -> Result<AssertExpr, AssertError> {
    let input = input.trim();

    if let Some(path) = input.strip_suffix("exists") {
        return Ok(AssertExpr::Exists {
            path: path.parse()?,
        });
    }

    if let Some((path, range)) = input.split_once(" in ")
        && !path.trim().contains(char::is_whitespace)
    {
        let (low, high) = parse_range(range)?;
        return Ok(AssertExpr::InRange {
            path: path.parse()?,
            low,
            high,
        });
    }

    let (position, op) = find_operator(input).ok_or_else(|| {
        AssertError::InvalidSyntax(format!("No valid operator found in assertion: {}", input))
    })?;
    let left = input[..position].trim();
    let right = input[position + op.symbol().len()..].trim();
    if left.is_empty() || right.is_empty() {
        return Err(AssertError::InvalidSyntax(format!(
            "Both sides of `{}` are required: {}",
            op, input
        )));
    }

    Ok(AssertExpr::Compare {
        left: left.parse()?,
        op,
        right: parse_literal(right),
    })
}

/// 最靠左的运算符；同一位置上 `ALL` 的顺序保证 `>=` 先于 `>`
fn find_operator(input: &str) -> Option<(usize, CompareOp)> {
    CompareOp::ALL
        .into_iter()
        .filter_map(|op| {
            let position = match op {
                // 作为单词出现，避免匹配 body.contains_x 这类路径
                CompareOp::Contains => input.find(" contains ").map(|p| p + 1),
                _ => input.find(op.symbol()),
            }?;
            Some((position, op))
        })
        .min_by_key(|(position, _)| *position)
}

fn parse_range(input: &str) -> Result<(f64, f64), AssertError> {
    let (low, high) = input
        .trim()
        .split_once("..")
        .ok_or_else(|| AssertError::InvalidSyntax(format!("Invalid range: {}", input)))?;
    let bound = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|_| AssertError::InvalidValue(format!("Invalid range bound: {}", s)))
    };
    let (low, high) = (bound(low)?, bound(high)?);
    if low > high {
        return Err(AssertError::InvalidValue(format!(
            "Range lower bound {} exceeds upper bound {}",
            low, high
        )));
    }
    Ok((low, high))
}

impl FromStr for ValuePath {
    type Err = AssertError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        match input {
            "status" => return Ok(ValuePath::Status),
            "response.time" => return Ok(ValuePath::ResponseTime),
            _ => {}
        }

        if let Some(name) = input.strip_prefix("headers.").filter(|n| !n.is_empty()) {
            return Ok(ValuePath::Header(name.to_ascii_lowercase()));
        }
        if let Some(path) = input.strip_prefix("body.") {
            let segments: Vec<String> = path.split('.').map(str::to_string).collect();
            if segments.iter().any(String::is_empty) {
                return Err(AssertError::InvalidSyntax(format!(
                    "Empty segment in body path: {}",
                    input
                )));
            }
            return Ok(ValuePath::Body(segments));
        }

        Err(AssertError::InvalidSyntax(format!(
            "Invalid value path: {}. Must start with 'status', 'headers.', 'body.', or 'response.time'",
            input
        )))
    }
}

/// 右值：`null`、布尔、引号字符串、数字；其余按裸字符串处理
fn parse_literal(input: &str) -> AssertValue {
    match input {
        "null" => return AssertValue::Null,
        "true" => return AssertValue::Bool(true),
        "false" => return AssertValue::Bool(false),
        _ => {}
    }

    let quoted = ['"', '\''].into_iter().find_map(|quote| {
        input
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
    });
    if let Some(text) = quoted {
        return AssertValue::String(text.to_string());
    }

    input
        .parse::<f64>()
        .map(AssertValue::Number)
        .unwrap_or_else(|_| AssertValue::String(input.to_string()))
}
