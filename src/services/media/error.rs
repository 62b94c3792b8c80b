// 媒体模块错误类型定义
//
// 解析、探测、持久化过程中可能出现的错误。
// 对外的解析与播放协调接口不会返回这些错误，它们只在模块内部用 `?` 传播，
// 最终在边界处被降级为占位图或日志。

use thiserror::Error;

/// 媒体模块的统一错误类型
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("解析错误: {0}")]
    Resolve(#[from] ResolveError),

    #[error("探测错误: {0}")]
    Probe(#[from] ProbeError),

    #[error("存储错误: {0}")]
    Store(#[from] StoreError),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),
}

/// URL 解析相关错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("无效的 URL: {0}")]
    InvalidUrl(String),

    #[error("未能提取文件标识: {0}")]
    IdentifierNotFound(String),

    #[error("结构化记录中没有可识别的字段")]
    UnrecognizedRecord,
}

/// 网络探测相关错误（健康检查与预加载共用）
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("网络错误: {0}")]
    NetworkError(String),

    #[error("探测超时")]
    Timeout,

    #[error("HTTP 错误: 状态码 {0}")]
    HttpError(u16),

    #[error("无效的 URL: {0}")]
    InvalidUrl(String),

    #[error("探测已取消")]
    Cancelled,
}

/// 持久化存储相关错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("读取状态失败: {0}")]
    Read(String),

    #[error("写入状态失败: {0}")]
    Write(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::Timeout
        } else if err.is_builder() {
            ProbeError::InvalidUrl(err.to_string())
        } else if let Some(status) = err.status() {
            ProbeError::HttpError(status.as_u16())
        } else {
            ProbeError::NetworkError(err.to_string())
        }
    }
}

impl From<reqwest::Error> for MediaError {
    fn from(err: reqwest::Error) -> Self {
        MediaError::Probe(ProbeError::from(err))
    }
}

impl From<url::ParseError> for ResolveError {
    fn from(err: url::ParseError) -> Self {
        ResolveError::InvalidUrl(err.to_string())
    }
}
