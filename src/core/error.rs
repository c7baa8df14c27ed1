//! 编排错误类型
//!
//! 能力识别与计划构建是全函数，不会出错；执行阶段的错误均来自外部服务（推理 / 向量库 / 缓存），
//! 原样向上传递。单个集合的检索失败在检索执行器内部吞掉，不会出现在这里。

use std::time::Duration;

use thiserror::Error;

/// 编排过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HiveError {
    #[error("Inference backend error: {0}")]
    Inference(String),

    #[error("Vector search failed on collection '{collection}': {message}")]
    VectorSearch { collection: String, message: String },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// 配置文件或环境变量无法解析
    #[error("Config error: {0}")]
    Config(String),

    /// 整个计划超过配置的执行期限
    #[error("Plan timed out after {0:?}")]
    Timeout(Duration),

    #[error("Execution cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for HiveError {
    fn from(e: serde_json::Error) -> Self {
        HiveError::Serialization(e.to_string())
    }
}

impl From<config::ConfigError> for HiveError {
    fn from(e: config::ConfigError) -> Self {
        HiveError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HiveError>;
