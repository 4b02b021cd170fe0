//! 契约漂移检查
//!
//! 指纹是 JSON 响应体展开后的结构：每个字段路径映射到该处的 JSON 类型，
//! 不关心具体取值。数组元素共用 `[]` 路径段，长度不同的列表指纹相同。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
    /// 数组元素（或重复路径）类型不一致
    Mixed,
}

impl FieldType {
    fn of(value: &Value) -> Self {
        match value {
            Value::Null => FieldType::Null,
            Value::Bool(_) => FieldType::Boolean,
            Value::Number(_) => FieldType::Number,
            Value::String(_) => FieldType::String,
            Value::Array(_) => FieldType::Array,
            Value::Object(_) => FieldType::Object,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Null => "null",
            FieldType::Boolean => "boolean",
            FieldType::Number => "number",
            FieldType::String => "string",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Mixed => "mixed",
        };
        f.write_str(name)
    }
}

/// 单个响应体的结构，按字段路径索引（`$`、`$.user.id`、`$.items[].sku`）
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint {
    pub fields: BTreeMap<String, FieldType>,
}

impl Fingerprint {
    pub fn of(value: &Value) -> Self {
        let mut fingerprint = Self::default();
        fingerprint.walk("$".to_string(), value);
        fingerprint
    }

    /// 计算响应体指纹；非 JSON 时返回 `None`
    pub fn from_body(body: &str) -> Option<Self> {
        if body.trim().is_empty() {
            return None;
        }
        serde_json::from_str::<Value>(body).ok().map(|v| Self::of(&v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn record(&mut self, path: &str, field_type: FieldType) {
        match self.fields.get_mut(path) {
            Some(existing) if *existing != field_type => {
                // null 元素不会让有类型的列表变成 mixed
                if *existing == FieldType::Null {
                    *existing = field_type;
                } else if field_type != FieldType::Null {
                    *existing = FieldType::Mixed;
                }
            }
            Some(_) => {}
            None => {
                self.fields.insert(path.to_string(), field_type);
            }
        }
    }

    fn walk(&mut self, path: String, value: &Value) {
        self.record(&path, FieldType::of(value));
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    self.walk(format!("{}.{}", path, key), child);
                }
            }
            Value::Array(items) => {
                let element_path = format!("{}[]", path);
                for item in items {
                    self.walk(element_path.clone(), item);
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftKind {
    Added,
    Removed,
    Changed,
}

/// 基线与当前响应结构之间的一处差异
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDrift {
    pub request_id: String,
    pub request_name: String,
    pub path: String,
    pub kind: DriftKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<FieldType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<FieldType>,
}

impl fmt::Display for ContractDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DriftKind::Added => write!(f, "{} added", self.path)?,
            DriftKind::Removed => write!(f, "{} removed", self.path)?,
            DriftKind::Changed => write!(f, "{} changed", self.path)?,
        }
        if let (Some(expected), Some(actual)) = (self.expected, self.actual) {
            write!(f, " ({} -> {})", expected, actual)?;
        }
        Ok(())
    }
}

/// 与基线比较，结果按路径排序
pub fn diff(
    request_id: &str,
    request_name: &str,
    baseline: &Fingerprint,
    current: &Fingerprint,
) -> Vec<ContractDrift> {
    let drift = |path: &str, kind, expected, actual| ContractDrift {
        request_id: request_id.to_string(),
        request_name: request_name.to_string(),
        path: path.to_string(),
        kind,
        expected,
        actual,
    };

    let mut drifts = Vec::new();
    for (path, expected) in &baseline.fields {
        match current.fields.get(path) {
            None => drifts.push(drift(path, DriftKind::Removed, Some(*expected), None)),
            Some(actual) if actual != expected => drifts.push(drift(
                path,
                DriftKind::Changed,
                Some(*expected),
                Some(*actual),
            )),
            Some(_) => {}
        }
    }
    for (path, actual) in &current.fields {
        if !baseline.fields.contains_key(path) {
            drifts.push(drift(path, DriftKind::Added, None, Some(*actual)));
        }
    }
    drifts.sort_by(|a, b| a.path.cmp(&b.path));
    drifts
}
