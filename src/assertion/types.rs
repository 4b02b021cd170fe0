use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// 断言错误类型
#[derive(Debug, thiserror::Error)]
pub enum AssertError {
    #[error("Invalid assertion syntax: {0}")]
    InvalidSyntax(String),

    #[error("Invalid operator: {0}")]
    InvalidOperator(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Value extraction failed: {0}")]
    ExtractionError(String),
}

/// 声明式断言
#[derive(Debug, Clone, PartialEq)]
pub enum AssertExpr {
    /// `path op literal`
    Compare {
        left: ValuePath,
        op: CompareOp,
        right: AssertValue,
    },
    /// `path exists`
    Exists { path: ValuePath },
    /// `path in low..high`，两端都包含
    InRange { path: ValuePath, low: f64, high: f64 },
}

impl fmt::Display for AssertExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertExpr::Compare { left, op, right } => write!(f, "{} {} {}", left, op, right),
            AssertExpr::Exists { path } => write!(f, "{} exists", path),
            AssertExpr::InRange { path, low, high } => write!(f, "{} in {}..{}", path, low, high),
        }
    }
}

/// 断言左侧：从响应中取值的位置
#[derive(Debug, Clone, PartialEq)]
pub enum ValuePath {
    Status,
    /// header 名已转小写
    Header(String),
    /// body 的 JSON 路径段，数字段可索引数组
    Body(Vec<String>),
    /// 毫秒
    ResponseTime,
}

impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValuePath::Status => f.write_str("status"),
            ValuePath::ResponseTime => f.write_str("response.time"),
            ValuePath::Header(name) => write!(f, "headers.{}", name),
            ValuePath::Body(segments) => write!(f, "body.{}", segments.join(".")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
    Contains,
}

impl CompareOp {
    /// 按匹配优先级排列：两字符运算符在单字符之前
    pub const ALL: [CompareOp; 7] = [
        CompareOp::GreaterOrEqual,
        CompareOp::LessOrEqual,
        CompareOp::Equal,
        CompareOp::NotEqual,
        CompareOp::Greater,
        CompareOp::Less,
        CompareOp::Contains,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Greater => ">",
            Self::Less => "<",
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
            Self::Contains => "contains",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.symbol() == symbol)
    }

    fn is_equality(&self) -> bool {
        matches!(self, Self::Equal | Self::NotEqual)
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Self::Equal => ordering.is_eq(),
            Self::NotEqual => ordering.is_ne(),
            Self::Greater => ordering.is_gt(),
            Self::Less => ordering.is_lt(),
            Self::GreaterOrEqual => ordering.is_ge(),
            Self::LessOrEqual => ordering.is_le(),
            Self::Contains => false,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// 断言右侧的字面量，也是从响应中取出的标量
#[derive(Debug, Clone, PartialEq)]
pub enum AssertValue {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
}

impl fmt::Display for AssertValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertValue::Number(n) => write!(f, "{}", n),
            AssertValue::String(s) => write!(f, "\"{}\"", s),
            AssertValue::Bool(b) => write!(f, "{}", b),
            AssertValue::Null => f.write_str("null"),
        }
    }
}

impl AssertValue {
    fn kind(&self) -> &'static str {
        match self {
            AssertValue::Number(_) => "number",
            AssertValue::String(_) => "string",
            AssertValue::Bool(_) => "boolean",
            AssertValue::Null => "null",
        }
    }

    /// `self op other`。数字可排序，字符串支持相等与 contains，布尔与 null 只支持相等
    pub fn compare(&self, op: CompareOp, other: &AssertValue) -> Result<bool, AssertError> {
        let mismatch = |expected: &str| AssertError::TypeMismatch {
            expected: expected.to_string(),
            actual: self.kind().to_string(),
        };

        match (self, other) {
            (AssertValue::Number(_), _) if op == CompareOp::Contains => Err(mismatch("string")),
            (AssertValue::Number(a), AssertValue::Number(b)) => {
                let ordering = if (a - b).abs() < f64::EPSILON {
                    Ordering::Equal
                } else {
                    a.partial_cmp(b)
                        .ok_or_else(|| AssertError::InvalidValue("NaN".to_string()))?
                };
                Ok(op.holds(ordering))
            }
            (AssertValue::String(haystack), AssertValue::String(needle))
                if op == CompareOp::Contains =>
            {
                Ok(haystack.contains(needle.as_str()))
            }
            (AssertValue::String(a), AssertValue::String(b)) if op.is_equality() => {
                Ok(op.holds(a.cmp(b)))
            }
            (AssertValue::String(_), AssertValue::String(_)) => Err(mismatch("number")),
            (AssertValue::Bool(_), AssertValue::Bool(_))
            | (AssertValue::Null, _)
            | (_, AssertValue::Null) => {
                if !op.is_equality() {
                    return Err(AssertError::InvalidOperator(format!(
                        "Operator {} not supported for {} values",
                        op,
                        self.kind()
                    )));
                }
                let equal = self == other;
                Ok(if op == CompareOp::Equal { equal } else { !equal })
            }
            _ => Err(mismatch(other.kind())),
        }
    }
}

/// 断言来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssertionSource {
    /// 请求上配置的声明式断言
    #[default]
    Declarative,
    /// 脚本中的 test / assert
    Script,
}

/// 单条断言的结果，声明式断言与脚本测试共用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResult {
    /// 声明式断言为原始表达式，脚本测试为测试名
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(default)]
    pub expected: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub source: AssertionSource,
}

impl AssertionResult {
    /// 声明式断言求值完成（通过与否由 `message` 是否存在决定）
    pub fn evaluated(
        name: String,
        actual: String,
        expected: String,
        message: Option<String>,
    ) -> Self {
        Self {
            name,
            passed: message.is_none(),
            actual: Some(actual),
            expected,
            message,
            source: AssertionSource::Declarative,
        }
    }

    /// 解析或取值失败
    pub fn error(name: String, error: AssertError) -> Self {
        Self {
            name,
            passed: false,
            actual: None,
            expected: String::new(),
            message: Some(error.to_string()),
            source: AssertionSource::Declarative,
        }
    }

    pub fn script(name: impl Into<String>, passed: bool, message: Option<String>) -> Self {
        Self {
            name: name.into(),
            passed,
            actual: None,
            expected: String::new(),
            message,
            source: AssertionSource::Script,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> AssertValue {
        AssertValue::Number(n)
    }

    fn text(s: &str) -> AssertValue {
        AssertValue::String(s.to_string())
    }

    #[test]
    fn test_symbols_round_trip() {
        for op in CompareOp::ALL {
            assert_eq!(CompareOp::from_symbol(op.symbol()), Some(op));
        }
        assert_eq!(CompareOp::from_symbol("=~"), None);
    }

    #[test]
    fn test_number_ordering() {
        assert!(num(10.0).compare(CompareOp::Equal, &num(10.0)).unwrap());
        assert!(num(10.0).compare(CompareOp::Greater, &num(5.0)).unwrap());
        assert!(num(5.0).compare(CompareOp::LessOrEqual, &num(5.0)).unwrap());
        assert!(!num(5.0).compare(CompareOp::NotEqual, &num(5.0)).unwrap());
        assert!(matches!(
            num(1.0).compare(CompareOp::Contains, &num(1.0)),
            Err(AssertError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_string_equality_and_contains() {
        let value = text("application/json; charset=utf-8");
        assert!(value.compare(CompareOp::Contains, &text("json")).unwrap());
        assert!(!value.compare(CompareOp::Equal, &text("json")).unwrap());
        assert!(value.compare(CompareOp::NotEqual, &text("json")).unwrap());
        assert!(matches!(
            value.compare(CompareOp::Greater, &text("a")),
            Err(AssertError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_null_and_bool() {
        assert!(AssertValue::Null.compare(CompareOp::Equal, &AssertValue::Null).unwrap());
        assert!(num(1.0).compare(CompareOp::NotEqual, &AssertValue::Null).unwrap());
        assert!(
            AssertValue::Bool(true)
                .compare(CompareOp::Equal, &AssertValue::Bool(true))
                .unwrap()
        );
        assert!(matches!(
            AssertValue::Null.compare(CompareOp::Greater, &num(1.0)),
            Err(AssertError::InvalidOperator(_))
        ));
        assert!(matches!(
            AssertValue::Bool(true).compare(CompareOp::Equal, &num(1.0)),
            Err(AssertError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_value_path_display() {
        assert_eq!(ValuePath::Status.to_string(), "status");
        assert_eq!(
            ValuePath::Header("content-type".to_string()).to_string(),
            "headers.content-type"
        );
        assert_eq!(
            ValuePath::Body(vec!["items".to_string(), "0".to_string()]).to_string(),
            "body.items.0"
        );
    }

    #[test]
    fn test_result_serialized_camel_case() {
        let result = AssertionResult::script("token issued", false, Some("no token".to_string()));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["source"], "script");
        assert_eq!(value["message"], "no token");
        assert!(value.get("actual").is_none());

        let declared = AssertionResult::evaluated(
            "status == 200".to_string(),
            "200".to_string(),
            "== 200".to_string(),
            None,
        );
        assert!(declared.passed);
        assert_eq!(declared.source, AssertionSource::Declarative);
    }
}
