use std::time::Duration;

use crate::http::serialization;
use crate::http::types::Method;
use crate::transport::Protocol;
use serde::{Deserialize, Serialize};

/// Basic 认证凭据，由传输层编码
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicCredentials {
    pub username: String,
    pub password: Option<String>,
}

/// 变量替换、认证注入之后的具体请求，交给传输层发送
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRequest {
    pub protocol: Protocol,
    pub method: Method,
    pub url: String,
    /// 保持原始顺序
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicCredentials>,
    #[serde(
        default,
        with = "serialization::optional_duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

impl ResolvedRequest {
    pub fn new(method: Method, url: &str) -> Self {
        Self {
            protocol: Protocol::Http,
            method,
            url: url.to_string(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            basic_auth: None,
            timeout: None,
        }
    }

    /// 获取 header（大小写不敏感）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// 设置 header，已存在时覆盖
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let Some(entry) = self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            entry.1 = value.to_string();
        } else {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }

    pub fn remove_header(&mut self, name: &str) -> bool {
        let before = self.headers.len();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        before != self.headers.len()
    }

    /// 设置 query 参数，已存在时覆盖
    pub fn set_query(&mut self, name: &str, value: &str) {
        if let Some(entry) = self.query.iter_mut().find(|(k, _)| k == name) {
            entry.1 = value.to_string();
        } else {
            self.query.push((name.to_string(), value.to_string()));
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.set_query(name, value);
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    /// URL 与 query 参数合并后的完整地址（用于报告与录制）
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let encoded: Vec<String> = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.url, separator, encoded.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_header_replaces_case_insensitive() {
        let mut request = ResolvedRequest::new(Method::Get, "http://localhost/")
            .with_header("Content-Type", "text/plain");
        request.set_header("content-type", "application/json");

        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.header("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn test_remove_header() {
        let mut request =
            ResolvedRequest::new(Method::Get, "http://localhost/").with_header("X-Token", "abc");
        assert!(request.remove_header("x-token"));
        assert!(!request.remove_header("x-token"));
        assert!(request.header("X-Token").is_none());
    }

    #[test]
    fn test_full_url() {
        let request = ResolvedRequest::new(Method::Get, "http://localhost/users")
            .with_query("page", "2")
            .with_query("size", "10");
        assert_eq!(request.full_url(), "http://localhost/users?page=2&size=10");

        let request =
            ResolvedRequest::new(Method::Get, "http://localhost/users?a=1").with_query("b", "2");
        assert_eq!(request.full_url(), "http://localhost/users?a=1&b=2");
    }
}
