//! 流量录制
//!
//! 缓存运行中实际发生的请求/响应，并生成一个可重放同样流量的新 [`Collection`]。

use crate::collection::{AuthConfig, Collection, KeyValue, SavedRequest};
use crate::http::{ResolvedRequest, Response};

/// 一个到达传输层并收到响应的请求
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub sequence: usize,
    pub request_id: String,
    pub name: String,
    pub chaos_case: Option<String>,
    pub request: ResolvedRequest,
    pub response: Response,
}

#[derive(Debug, Default)]
pub struct TrafficRecorder {
    exchanges: Vec<Exchange>,
}

impl TrafficRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, exchange: Exchange) {
        self.exchanges.push(exchange);
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// 按计划序号生成重放集合
    pub fn into_collection(mut self, source: &Collection) -> Collection {
        self.exchanges.sort_by_key(|e| e.sequence);
        let mut collection = Collection::new(
            format!("{}-recorded", source.id),
            format!("{} (recorded)", source.name),
        );
        collection.requests = self.exchanges.iter().map(to_saved_request).collect();
        collection
    }
}

fn to_saved_request(exchange: &Exchange) -> SavedRequest {
    let request = &exchange.request;
    let name = match &exchange.chaos_case {
        Some(case) => format!("{} [{}]", exchange.name, case),
        None => exchange.name.clone(),
    };

    let mut saved = SavedRequest::new(format!("rec-{}", exchange.sequence), name, &request.url)
        .with_method(request.method.as_str())
        .with_assertion(&format!("status == {}", exchange.response.status.code()));
    saved.protocol = request.protocol;
    saved.headers = request
        .headers
        .iter()
        .filter(|(key, _)| !should_skip_header(key))
        .map(|(key, value)| KeyValue::new(key, value))
        .collect();
    saved.params = request
        .query
        .iter()
        .map(|(key, value)| KeyValue::new(key, value))
        .collect();
    saved.body = request.body.clone().filter(|b| !b.is_empty());
    if let Some(credentials) = &request.basic_auth {
        saved.auth = AuthConfig::Basic {
            username: credentials.username.clone(),
            password: credentials.password.clone().unwrap_or_default(),
        };
    }
    saved.timeout_ms = request.timeout.map(|t| t.as_millis() as u64);
    saved
}

fn should_skip_header(name: &str) -> bool {
    let name_lower = name.to_lowercase();
    matches!(
        name_lower.as_str(),
        "content-length" | "host" | "connection" | "accept-encoding" | "user-agent"
    )
}
