//! 领域模型
//!
//! 推送分发链路上使用的核心实体。字段为各实体在通知场景下需要的
//! 最小集合，完整的持久化模型由仓储层负责。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 消息
///
/// 上游在发布事件前已完成正文解析，纯文本与内嵌引用随事件携带，
/// 本结构只保留标识信息。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub channel_id: Uuid,
    /// 发送者
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// 内嵌引用的类别
///
/// 上游解析器只产出这三种引用，未知类别在解析阶段即被丢弃。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddedKind {
    User,
    Group,
    File,
}

/// 消息正文中的内嵌引用（用户提及、用户组提及、文件附件）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedInfo {
    pub kind: EmbeddedKind,
    pub id: Uuid,
}

/// 频道
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub is_public: bool,
    /// 强制通知频道：所有活跃非 bot 用户都会收到推送
    pub is_forced: bool,
    /// 两名用户之间的私聊频道，由频道元数据推导
    pub is_dm: bool,
}

/// 用户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// 登录名，用于构造 URL
    pub name: String,
    /// 显示名，为空时回退到 name
    pub display_name: String,
    pub is_active: bool,
    pub is_bot: bool,
}

/// 文件元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub id: Uuid,
    pub has_thumbnail: bool,
}
