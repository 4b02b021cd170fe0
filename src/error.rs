use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunpostError {
    #[error("依赖循环: {0}")]
    DependencyCycle(String),

    #[error("无法解析的依赖: 请求 '{request}' 引用了不存在的 '{reference}'")]
    UnresolvedDependency { request: String, reference: String },

    #[error("重复的请求 ID: {0}")]
    DuplicateRequestId(String),

    #[error("数据集错误: {0}")]
    Dataset(String),

    #[error("解析错误: {0}")]
    ParseError(String),

    #[error("无效的 URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP 请求失败: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("配置文件错误: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("URL 解析错误: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("基线存储错误: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

impl RunpostError {
    /// 是否为配置级错误（运行在发出任何请求之前被拒绝）
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RunpostError::DependencyCycle(_)
                | RunpostError::UnresolvedDependency { .. }
                | RunpostError::DuplicateRequestId(_)
                | RunpostError::Dataset(_)
        )
    }
}

impl From<anyhow::Error> for RunpostError {
    fn from(err: anyhow::Error) -> Self {
        RunpostError::Other(err.to_string())
    }
}

/// Result type for runpost crate
pub type Result<T> = std::result::Result<T, RunpostError>;
