use crate::http::serialization;
use crate::http::types::Status;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// 传输层返回的响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status: Status,
    /// header 名称统一为小写
    pub headers: BTreeMap<String, String>,
    pub body: String,
    #[serde(rename = "durationMs", with = "serialization::duration_ms")]
    pub duration: Duration,
}

impl Response {
    pub fn new<I, K, V>(status: u16, headers: I, body: String, duration: Duration) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Ok(Self {
            status: Status::new(status)?,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
                .collect(),
            body,
            duration,
        })
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }

    /// 尝试将 body 解析为 JSON，空 body 或非 JSON 返回 None
    pub fn json(&self) -> Option<serde_json::Value> {
        if self.body.trim().is_empty() {
            return None;
        }
        serde_json::from_str(&self.body).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_lowercased() {
        let response = Response::new(
            200,
            [("Content-Type", "application/json")],
            "{}".to_string(),
            Duration::from_millis(5),
        )
        .unwrap();
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn test_invalid_status_rejected() {
        let headers: [(&str, &str); 0] = [];
        assert!(Response::new(42, headers, String::new(), Duration::ZERO).is_err());
    }

    #[test]
    fn test_json_body() {
        let headers: [(&str, &str); 0] = [];
        let response =
            Response::new(200, headers, r#"{"id": 7}"#.to_string(), Duration::ZERO).unwrap();
        assert_eq!(response.json().unwrap()["id"], 7);

        let headers: [(&str, &str); 0] = [];
        let text = Response::new(200, headers, "plain".to_string(), Duration::ZERO).unwrap();
        assert!(text.json().is_none());
    }

    #[test]
    fn test_duration_serialized_as_millis() {
        let headers: [(&str, &str); 0] = [];
        let response =
            Response::new(204, headers, String::new(), Duration::from_millis(250)).unwrap();
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["durationMs"], 250.0);
        assert_eq!(value["status"], 204);
    }
}
