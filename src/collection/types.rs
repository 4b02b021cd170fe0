use crate::transport::Protocol;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 键值对（header / query 参数），可单独禁用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            enabled: true,
        }
    }
}

/// API Key 放置位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

/// 请求认证配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuthConfig {
    #[default]
    None,
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        #[serde(default)]
        password: String,
    },
    ApiKey {
        key: String,
        value: String,
        #[serde(default)]
        location: ApiKeyLocation,
    },
}

/// 集合中保存的单个请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRequest {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub protocol: Protocol,

    /// HTTP 方法，缺省为 GET
    #[serde(default = "default_method")]
    pub method: String,

    pub url: String,

    #[serde(default)]
    pub headers: Vec<KeyValue>,

    #[serde(default)]
    pub params: Vec<KeyValue>,

    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub auth: AuthConfig,

    /// 声明式断言，例如 `status == 200`
    #[serde(default)]
    pub assertions: Vec<String>,

    #[serde(default)]
    pub pre_request_script: Option<String>,

    #[serde(default)]
    pub post_response_script: Option<String>,

    /// 依赖的请求（名称或 ID）
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// 运行条件表达式
    #[serde(default)]
    pub condition: Option<String>,

    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl SavedRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            protocol: Protocol::default(),
            method: default_method(),
            url: url.into(),
            headers: Vec::new(),
            params: Vec::new(),
            body: None,
            auth: AuthConfig::None,
            assertions: Vec::new(),
            pre_request_script: None,
            post_response_script: None,
            depends_on: Vec::new(),
            condition: None,
            timeout_ms: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.push(KeyValue::new(key, value));
        self
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.push(KeyValue::new(key, value));
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    pub fn with_assertion(mut self, assertion: &str) -> Self {
        self.assertions.push(assertion.to_string());
        self
    }

    pub fn depends_on(mut self, reference: &str) -> Self {
        self.depends_on.push(reference.to_string());
        self
    }

    pub fn with_condition(mut self, condition: &str) -> Self {
        self.condition = Some(condition.to_string());
        self
    }

    pub fn with_pre_request_script(mut self, script: &str) -> Self {
        self.pre_request_script = Some(script.to_string());
        self
    }

    pub fn with_post_response_script(mut self, script: &str) -> Self {
        self.post_response_script = Some(script.to_string());
        self
    }
}

/// 文件夹，可嵌套
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub requests: Vec<SavedRequest>,
    #[serde(default)]
    pub folders: Vec<Folder>,
}

/// 请求集合，运行期间只读
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub requests: Vec<SavedRequest>,
    #[serde(default)]
    pub folders: Vec<Folder>,
    /// 集合级变量（优先级最低）
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

impl Collection {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_request(mut self, request: SavedRequest) -> Self {
        self.requests.push(request);
        self
    }

    pub fn with_folder(mut self, folder: Folder) -> Self {
        self.folders.push(folder);
        self
    }

    /// 按声明顺序展开所有请求：先顶层请求，再深度优先遍历文件夹
    pub fn flatten(&self) -> Vec<&SavedRequest> {
        let mut out: Vec<&SavedRequest> = self.requests.iter().collect();
        for folder in &self.folders {
            collect_folder(folder, &mut out);
        }
        out
    }

    pub fn request_count(&self) -> usize {
        self.flatten().len()
    }
}

fn collect_folder<'a>(folder: &'a Folder, out: &mut Vec<&'a SavedRequest>) {
    out.extend(folder.requests.iter());
    for child in &folder.folders {
        collect_folder(child, out);
    }
}
