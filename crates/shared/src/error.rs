//! 统一错误处理模块
//!
//! 定义各子系统共享的错误类型，使用 thiserror 提供良好的错误信息。
//! 仓储实现负责将底层存储错误映射为 `ChatError`。

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    #[error("仓储访问失败: {0}")]
    Repository(String),

    #[error("配置加载失败: {0}")]
    Config(#[from] config::ConfigError),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, ChatError>;

impl ChatError {
    /// 构造记录未找到错误
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }
}
