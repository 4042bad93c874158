//! 推送分发器错误类型
//!
//! 区分凭证加载、令牌获取与发送阶段的错误，
//! 便于上层根据错误类型决定重试或丢弃策略。

use thiserror::Error;

use crate::client::SendError;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("加载推送服务凭证失败: {0}")]
    Credentials(String),

    #[error("获取访问令牌失败: {0}")]
    Token(String),

    #[error("推送发送失败: {0}")]
    Send(#[from] SendError),

    #[error(transparent)]
    Shared(#[from] chat_shared::error::ChatError),
}
