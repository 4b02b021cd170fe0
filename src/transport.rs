//! 传输层端口
//!
//! 引擎本身不实现任何线路协议。每种协议（HTTP、GraphQL、gRPC、WebSocket）
//! 都通过同样的 `send(request, cancel)` 调用，按协议注册在 [`TransportRegistry`] 中。

use crate::http::{ResolvedRequest, Response};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// 保存请求的协议类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Graphql,
    Grpc,
    Websocket,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Graphql => "graphql",
            Protocol::Grpc => "grpc",
            Protocol::Websocket => "websocket",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个请求的传输失败；记录在结果中，不会中止运行
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("request cancelled")]
    Cancelled,

    #[error("no transport registered for protocol '{0}'")]
    Unsupported(Protocol),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// 对某个协议后端的一次调用
///
/// `cancel` 触发时实现应尽快返回 [`TransportError::Cancelled`]；
/// 无法中断的实现可以继续完成，调度器会丢弃其结果。
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &ResolvedRequest,
        cancel: &CancellationToken,
    ) -> Result<Response, TransportError>;
}

/// 协议到传输实现的映射
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: HashMap<Protocol, Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有协议都由同一个传输实现处理
    pub fn uniform(transport: Arc<dyn Transport>) -> Self {
        let mut registry = Self::new();
        for protocol in [
            Protocol::Http,
            Protocol::Graphql,
            Protocol::Grpc,
            Protocol::Websocket,
        ] {
            registry.register(protocol, transport.clone());
        }
        registry
    }

    pub fn register(&mut self, protocol: Protocol, transport: Arc<dyn Transport>) {
        self.transports.insert(protocol, transport);
    }

    pub fn with(mut self, protocol: Protocol, transport: Arc<dyn Transport>) -> Self {
        self.register(protocol, transport);
        self
    }

    pub fn get(&self, protocol: Protocol) -> Option<Arc<dyn Transport>> {
        self.transports.get(&protocol).cloned()
    }

    /// 分派到请求协议对应的传输实现
    pub async fn send(
        &self,
        request: &ResolvedRequest,
        cancel: &CancellationToken,
    ) -> Result<Response, TransportError> {
        match self.get(request.protocol) {
            Some(transport) => transport.send(request, cancel).await,
            None => Err(TransportError::Unsupported(request.protocol)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    #[tokio::test]
    async fn test_missing_transport_is_unsupported() {
        let registry = TransportRegistry::new();
        let mut request = ResolvedRequest::new(Method::Get, "http://localhost/ping");
        request.protocol = Protocol::Grpc;

        let err = registry
            .send(&request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Unsupported(Protocol::Grpc));
        assert_eq!(
            err.to_string(),
            "no transport registered for protocol 'grpc'"
        );
    }
}
