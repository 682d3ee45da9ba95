use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuloadError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("未解析的变量: {0}")]
    UnresolvedVariable(String),

    #[error("模板渲染失败: {0}")]
    TemplateRender(String),

    #[error("未知的表达式函数: {0}")]
    UnknownExpressionFunction(String),

    #[error("条件表达式错误: {0}")]
    Expression(String),

    #[error("数据源已耗尽: {0}")]
    DataExhausted(String),

    #[error("连接失败: {0}")]
    Connection(String),

    #[error("请求超时: {0}")]
    Timeout(String),

    #[error("协议错误: {0}")]
    Protocol(String),

    #[error("无效的 URL: {0}")]
    InvalidUrl(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML 解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("CSV 解析错误: {0}")]
    CsvError(#[from] csv::Error),

    #[error("URL 解析错误: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("{0}")]
    Other(String),
}

impl RuloadError {
    /// 请求本身没有完成（网络层失败），区别于断言失败
    pub fn is_request_failure(&self) -> bool {
        matches!(
            self,
            RuloadError::Connection(_) | RuloadError::Timeout(_) | RuloadError::Protocol(_)
        )
    }
}

impl From<reqwest::Error> for RuloadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RuloadError::Timeout(err.to_string())
        } else if err.is_connect() {
            RuloadError::Connection(err.to_string())
        } else {
            RuloadError::Protocol(err.to_string())
        }
    }
}

// Add conversion from anyhow::Error
impl From<anyhow::Error> for RuloadError {
    fn from(err: anyhow::Error) -> Self {
        RuloadError::Other(err.to_string())
    }
}

/// Result type for ruload crate
pub type Result<T> = std::result::Result<T, RuloadError>;
