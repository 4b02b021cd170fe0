//! 混沌引擎
//!
//! 为请求派生故障注入变体。`light` 用例只取决于请求本身的结构；
//! `aggressive` 追加延迟、载荷截断与模糊用例，其随机值在规划阶段一次性抽取，
//! 同一个用例每次应用的变换都相同。

use crate::collection::SavedRequest;
use crate::http::ResolvedRequest;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const INVALID_CONTENT_TYPE: &str = "application/x-runpost-invalid";

const FUZZ_VALUES: &[&str] = &[
    "",
    " ",
    "null",
    "-1",
    "0",
    "99999999999999999999",
    "' OR '1'='1",
    "<script>alert(1)</script>",
    "../../../../etc/passwd",
    "%00",
    "\u{1F4A5}\u{202E}",
    "{{undefined}}",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChaosLevel {
    #[default]
    Light,
    Aggressive,
}

impl fmt::Display for ChaosLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChaosLevel::Light => f.write_str("light"),
            ChaosLevel::Aggressive => f.write_str("aggressive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChaosKind {
    DropHeader(String),
    EmptyBody,
    CorruptEncoding,
    InvalidContentType,
    Latency(Duration),
    TruncatePayload,
    FuzzQuery { seed: u64 },
    FuzzBody { seed: u64 },
}

/// 请求的一个故障注入变体
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChaosCase {
    pub name: String,
    pub kind: ChaosKind,
}

impl ChaosCase {
    fn new(name: impl Into<String>, kind: ChaosKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// 变换已替换变量的请求；返回发送前需要注入的延迟
    pub fn apply(&self, request: &mut ResolvedRequest) -> Option<Duration> {
        match &self.kind {
            ChaosKind::DropHeader(name) => {
                request.remove_header(name);
            }
            ChaosKind::EmptyBody => {
                request.body = Some(String::new());
            }
            ChaosKind::CorruptEncoding => {
                let body = request.body.take().unwrap_or_default();
                request.body = Some(mojibake(&body));
                let media_type = request
                    .header("content-type")
                    .and_then(|v| v.split(';').next())
                    .map(|v| v.trim().to_string())
                    .unwrap_or_else(|| "text/plain".to_string());
                let content_type = format!("{}; charset=iso-8859-1", media_type);
                request.set_header("Content-Type", &content_type);
            }
            ChaosKind::InvalidContentType => {
                request.set_header("Content-Type", INVALID_CONTENT_TYPE);
            }
            ChaosKind::Latency(delay) => return Some(*delay),
            ChaosKind::TruncatePayload => {
                if let Some(body) = request.body.as_mut() {
                    let mut cut = body.len() / 2;
                    while !body.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    body.truncate(cut);
                }
            }
            ChaosKind::FuzzQuery { seed } => {
                let mut rng = StdRng::seed_from_u64(*seed);
                if request.query.is_empty() {
                    request.query.push(("fuzz".to_string(), fuzz_value(&mut rng)));
                } else {
                    for (_, value) in request.query.iter_mut() {
                        *value = fuzz_value(&mut rng);
                    }
                }
            }
            ChaosKind::FuzzBody { seed } => {
                let mut rng = StdRng::seed_from_u64(*seed);
                let fuzzed = match request
                    .body
                    .as_deref()
                    .and_then(|b| serde_json::from_str::<serde_json::Value>(b).ok())
                {
                    Some(mut json) => {
                        fuzz_json(&mut json, &mut rng);
                        json.to_string()
                    }
                    None => fuzz_value(&mut rng),
                };
                request.body = Some(fuzzed);
            }
        }
        None
    }
}

/// 为单个请求生成混沌用例
///
/// `light` 不使用 `rng`，每次运行得到的用例列表相同。
pub fn generate_cases<R: Rng>(
    request: &SavedRequest,
    level: ChaosLevel,
    rng: &mut R,
) -> Vec<ChaosCase> {
    let mut cases = Vec::new();

    let mut seen: Vec<String> = Vec::new();
    for header in request.headers.iter().filter(|h| h.enabled) {
        let lowered = header.key.to_ascii_lowercase();
        if seen.contains(&lowered) {
            continue;
        }
        seen.push(lowered);
        cases.push(ChaosCase::new(
            format!("drop-header:{}", header.key),
            ChaosKind::DropHeader(header.key.clone()),
        ));
    }
    cases.push(ChaosCase::new("empty-body", ChaosKind::EmptyBody));
    cases.push(ChaosCase::new("corrupt-encoding", ChaosKind::CorruptEncoding));
    cases.push(ChaosCase::new(
        "invalid-content-type",
        ChaosKind::InvalidContentType,
    ));

    if level == ChaosLevel::Aggressive {
        let delay = Duration::from_millis(rng.random_range(100..=2000));
        cases.push(ChaosCase::new(
            format!("latency:{}ms", delay.as_millis()),
            ChaosKind::Latency(delay),
        ));
        cases.push(ChaosCase::new("truncate-payload", ChaosKind::TruncatePayload));
        cases.push(ChaosCase::new(
            "fuzz-query",
            ChaosKind::FuzzQuery {
                seed: rng.random(),
            },
        ));
        cases.push(ChaosCase::new(
            "fuzz-body",
            ChaosKind::FuzzBody {
                seed: rng.random(),
            },
        ));
    }

    cases
}

/// 单次运行的随机数生成器；给定种子时可复现
pub fn run_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// 把 UTF-8 字节按 Latin-1 重新解码
fn mojibake(text: &str) -> String {
    let source = if text.is_empty() { "\u{00E9}t\u{00E9}" } else { text };
    source.bytes().map(char::from).collect()
}

fn fuzz_value<R: Rng>(rng: &mut R) -> String {
    FUZZ_VALUES.choose(rng).copied().unwrap_or_default().to_string()
}

fn fuzz_json<R: Rng>(value: &mut serde_json::Value, rng: &mut R) {
    use serde_json::Value;
    match value {
        Value::String(s) => *s = fuzz_value(rng),
        Value::Number(n) => {
            *n = serde_json::Number::from(rng.random_range(i64::MIN / 2..i64::MAX / 2));
        }
        Value::Bool(b) => *b = !*b,
        Value::Array(items) => items.iter_mut().for_each(|v| fuzz_json(v, rng)),
        Value::Object(map) => map.values_mut().for_each(|v| fuzz_json(v, rng)),
        Value::Null => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    fn request() -> SavedRequest {
        SavedRequest::new("r1", "create", "http://localhost/users")
            .with_method("POST")
            .with_header("Authorization", "Bearer x")
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"name": "alice", "age": 30}"#)
    }

    fn names(cases: &[ChaosCase]) -> Vec<&str> {
        cases.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_light_catalog_is_stable() {
        let first = generate_cases(&request(), ChaosLevel::Light, &mut run_rng(None));
        let second = generate_cases(&request(), ChaosLevel::Light, &mut run_rng(None));
        assert_eq!(first, second);
        assert_eq!(
            names(&first),
            vec![
                "drop-header:Authorization",
                "drop-header:Content-Type",
                "empty-body",
                "corrupt-encoding",
                "invalid-content-type",
            ]
        );
    }

    #[test]
    fn test_disabled_and_duplicate_headers_skipped() {
        let mut saved = request().with_header("authorization", "Bearer y");
        saved.headers[1].enabled = false;
        let cases = generate_cases(&saved, ChaosLevel::Light, &mut run_rng(Some(1)));
        assert_eq!(cases.len(), 4);
    }

    #[test]
    fn test_aggressive_extends_light() {
        let cases = generate_cases(&request(), ChaosLevel::Aggressive, &mut run_rng(Some(7)));
        assert_eq!(cases.len(), 9);
        assert!(cases[5].name.starts_with("latency:"));
        assert_eq!(&names(&cases)[6..], &["truncate-payload", "fuzz-query", "fuzz-body"]);

        let again = generate_cases(&request(), ChaosLevel::Aggressive, &mut run_rng(Some(7)));
        assert_eq!(cases, again);
    }

    #[test]
    fn test_apply_mutations() {
        let base = ResolvedRequest::new(Method::Post, "http://localhost/users")
            .with_header("Content-Type", "application/json")
            .with_header("Authorization", "Bearer x")
            .with_body(r#"{"name":"café"}"#);

        let mut dropped = base.clone();
        ChaosCase::new("d", ChaosKind::DropHeader("authorization".into())).apply(&mut dropped);
        assert!(dropped.header("Authorization").is_none());

        let mut empty = base.clone();
        ChaosCase::new("e", ChaosKind::EmptyBody).apply(&mut empty);
        assert_eq!(empty.body.as_deref(), Some(""));

        let mut corrupt = base.clone();
        ChaosCase::new("c", ChaosKind::CorruptEncoding).apply(&mut corrupt);
        assert_eq!(
            corrupt.header("content-type"),
            Some("application/json; charset=iso-8859-1")
        );
        assert_ne!(corrupt.body, base.body);

        let mut invalid = base.clone();
        ChaosCase::new("i", ChaosKind::InvalidContentType).apply(&mut invalid);
        assert_eq!(invalid.header("content-type"), Some(INVALID_CONTENT_TYPE));

        let mut truncated = base.clone();
        ChaosCase::new("t", ChaosKind::TruncatePayload).apply(&mut truncated);
        assert!(truncated.body.unwrap().len() < base.body.as_ref().unwrap().len());

        let mut slow = base.clone();
        let delay = ChaosCase::new("l", ChaosKind::Latency(Duration::from_millis(5)))
            .apply(&mut slow);
        assert_eq!(delay, Some(Duration::from_millis(5)));
        assert_eq!(slow, base);
    }

    #[test]
    fn test_fuzz_is_reproducible_per_case() {
        let base = ResolvedRequest::new(Method::Get, "http://localhost/search")
            .with_query("q", "shoes")
            .with_body(r#"{"tags": ["a", "b"], "limit": 10}"#);
        let case = ChaosCase::new("fuzz-body", ChaosKind::FuzzBody { seed: 42 });

        let mut a = base.clone();
        let mut b = base.clone();
        case.apply(&mut a);
        case.apply(&mut b);
        assert_eq!(a.body, b.body);
        let json: serde_json::Value = serde_json::from_str(a.body.as_deref().unwrap()).unwrap();
        assert!(json["tags"].is_array());

        let mut query = base.clone();
        ChaosCase::new("fuzz-query", ChaosKind::FuzzQuery { seed: 1 }).apply(&mut query);
        assert_eq!(query.query.len(), 1);
        assert_eq!(query.query[0].0, "q");
    }
}
