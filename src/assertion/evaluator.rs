use crate::assertion::extractor::extract_value;
use crate::assertion::parser::parse_assertion;
use crate::assertion::types::{AssertError, AssertExpr, AssertValue, AssertionResult};
use crate::http::Response;

/// 对一次响应求值单条断言
pub fn evaluate_assertion(assertion: &AssertExpr, response: &Response) -> AssertionResult {
    let name = assertion.to_string();

    match assertion {
        AssertExpr::Compare { left, op, right } => {
            let actual = match extract_value(response, left) {
                Ok(value) => value,
                Err(e) => return AssertionResult::error(name, e),
            };
            let expected = format!("{} {}", op, right);
            match actual.compare(*op, right) {
                Ok(passed) => {
                    let message = (!passed).then(|| {
                        format!("Expected {} {}, but got {}", left, expected, actual)
                    });
                    AssertionResult::evaluated(name, actual.to_string(), expected, message)
                }
                Err(e) => AssertionResult::error(name, e),
            }
        }

        AssertExpr::Exists { path } => {
            let (actual, message) = match extract_value(response, path) {
                Ok(value) => (value.to_string(), None),
                // 对象和数组无法比较，但确实存在
                Err(AssertError::ExtractionError(_)) => ("<structured>".to_string(), None),
                Err(_) => (
                    "not found".to_string(),
                    Some(format!("Expected {} to exist, but it was not found", path)),
                ),
            };
            AssertionResult::evaluated(name, actual, "exists".to_string(), message)
        }

        AssertExpr::InRange { path, low, high } => {
            let expected = format!("in {}..{}", low, high);
            match extract_value(response, path) {
                Ok(actual) => {
                    let inside =
                        matches!(actual, AssertValue::Number(n) if n >= *low && n <= *high);
                    let message = (!inside).then(|| {
                        format!("Expected {} {}, but got {}", path, expected, actual)
                    });
                    AssertionResult::evaluated(name, actual.to_string(), expected, message)
                }
                Err(e) => AssertionResult::error(name, e),
            }
        }
    }
}

/// 解析并求值一组断言；空行忽略，解析失败记为失败，结果名保留原文
pub fn evaluate_all(assertions: &[String], response: &Response) -> Vec<AssertionResult> {
    assertions
        .iter()
        .map(|raw| raw.trim())
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            let mut result = match parse_assertion(raw) {
                Ok(expr) => evaluate_assertion(&expr, response),
                Err(e) => AssertionResult::error(String::new(), e),
            };
            result.name = raw.to_string();
            result
        })
        .collect()
}
