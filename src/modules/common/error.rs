use thiserror::Error;

#[derive(Error, Debug)]
pub enum CleanerError {
    #[error("注册表错误: {0}")]
    Registry(String),

    #[error("文件系统错误: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("权限不足: {0}")]
    PermissionDenied(String),

    #[error("关键系统项: {0}")]
    CriticalSystemItem(String),

    #[error("未找到: {0}")]
    NotFound(String),

    #[error("前置条件不满足: {0}")]
    Precondition(String),

    #[error("外部工具失败: {0}")]
    Tool(String),

    #[error("超时: {0}")]
    Timeout(String),

    #[error("操作已取消")]
    Canceled,

    #[error("序列化错误: {0}")]
    Serde(String),

    #[error("其他错误: {0}")]
    Other(String),
}

impl From<serde_json::Error> for CleanerError {
    fn from(error: serde_json::Error) -> Self {
        CleanerError::Serde(error.to_string())
    }
}
