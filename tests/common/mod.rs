#![allow(dead_code)]

use async_trait::async_trait;
use runpost::http::{ResolvedRequest, Response};
use runpost::transport::{Transport, TransportError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
enum Reply {
    Respond {
        status: u16,
        body: String,
        latency: Duration,
    },
    Fail(String),
}

/// 一次传输调用的记录
#[derive(Clone)]
pub struct Call {
    pub request: ResolvedRequest,
    pub at: Instant,
}

/// 可编程的假传输层：按 URL 返回固定响应，记录所有调用
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<Call>>,
    cancel_on_call: Mutex<Option<(usize, CancellationToken)>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, url: &str, status: u16, body: &str) {
        self.route_with_latency(url, status, body, Duration::from_millis(2));
    }

    pub fn route_with_latency(&self, url: &str, status: u16, body: &str, latency: Duration) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Reply::Respond {
                status,
                body: body.to_string(),
                latency,
            },
        );
    }

    pub fn fail(&self, url: &str, message: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Reply::Fail(message.to_string()));
    }

    /// 第 `call` 次调用（从 1 开始）时触发取消
    pub fn cancel_on_call(&self, call: usize, token: CancellationToken) {
        *self.cancel_on_call.lock().unwrap() = Some((call, token));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| c.request.full_url())
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(
        &self,
        request: &ResolvedRequest,
        cancel: &CancellationToken,
    ) -> Result<Response, TransportError> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call {
                request: request.clone(),
                at: Instant::now(),
            });
            calls.len()
        };
        if let Some((at, token)) = self.cancel_on_call.lock().unwrap().as_ref()
            && *at == count
        {
            token.cancel();
        }

        let reply = self
            .routes
            .lock()
            .unwrap()
            .get(&request.full_url())
            .cloned()
            .unwrap_or(Reply::Respond {
                status: 404,
                body: String::new(),
                latency: Duration::from_millis(1),
            });

        match reply {
            Reply::Fail(message) => Err(TransportError::Network(message)),
            Reply::Respond {
                status,
                body,
                latency,
            } => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(TransportError::Cancelled),
                    _ = tokio::time::sleep(latency) => Ok(Response::new(
                        status,
                        [("content-type", "application/json")],
                        body,
                        latency,
                    )
                    .unwrap()),
                }
            }
        }
    }
}
