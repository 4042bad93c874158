//! 推送服务客户端抽象
//!
//! 通过 `PushClient` trait 抽象推送服务的发送行为，生产环境使用
//! FCM HTTP v1 实现，测试使用脚本化的 mock。发送错误在此处归类为
//! 可重试与不可重试两类，投递工作者据此决定退避重试或立即放弃。

use async_trait::async_trait;
use thiserror::Error;

use crate::payload::NotificationPayload;

/// 单次发送的失败原因
///
/// 归类规则：
/// - `NotRegistered` 触发设备令牌回收，随后终止该次投递
/// - `InvalidArgument` 为永久错误，立即放弃
/// - 其余均视为瞬时错误，按退避策略重试
#[derive(Debug, Clone, Error)]
pub enum SendError {
    #[error("设备令牌未注册")]
    NotRegistered,

    #[error("推送请求参数无效: {0}")]
    InvalidArgument(String),

    #[error("推送服务暂不可用: {0}")]
    Unavailable(String),

    #[error("推送服务内部错误: {0}")]
    Internal(String),

    #[error("推送消息速率超限")]
    RateExceeded,

    #[error("未知推送错误: {0}")]
    Unknown(String),
}

impl SendError {
    /// 是否为瞬时错误（可在退避后重试）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Internal(_) | Self::RateExceeded | Self::Unknown(_)
        )
    }
}

/// 推送服务客户端
#[async_trait]
pub trait PushClient: Send + Sync {
    /// 向单个设备令牌发送通知
    async fn send(&self, token: &str, payload: &NotificationPayload) -> Result<(), SendError>;
}
