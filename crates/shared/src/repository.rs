//! 仓储接口
//!
//! 推送分发器对持久层的唯一依赖面。具体实现（数据库、缓存）由宿主
//! 服务器提供，通过 trait object 注入，避免泛型传播到整个调用链。

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Channel, FileMeta, User};

/// 用户查询条件
///
/// 以值语义链式组合过滤条件，与仓储实现解耦。成员类过滤条件
/// （频道成员、订阅者、用户组成员）互斥时以先设置者为准，调用方
/// 不应同时设置多个。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsersQuery {
    pub active: bool,
    pub not_bot: bool,
    pub c_member_of: Option<Uuid>,
    pub subscriber_of: Option<Uuid>,
    pub g_member_of: Option<Uuid>,
}

impl UsersQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// 仅活跃用户
    pub fn active(mut self) -> Self {
        self.active = true;
        self
    }

    /// 排除 bot 用户
    pub fn not_bot(mut self) -> Self {
        self.not_bot = true;
        self
    }

    /// 仅指定私有频道的成员
    pub fn c_member_of(mut self, channel_id: Uuid) -> Self {
        self.c_member_of = Some(channel_id);
        self
    }

    /// 仅指定频道的通知订阅者
    pub fn subscriber_of(mut self, channel_id: Uuid) -> Self {
        self.subscriber_of = Some(channel_id);
        self
    }

    /// 仅指定用户组的成员
    pub fn g_member_of(mut self, group_id: Uuid) -> Self {
        self.g_member_of = Some(group_id);
        self
    }
}

/// 仓储接口
///
/// 除 `unregister_device` 外均为只读操作。`unregister_device` 按令牌
/// 删除，要求幂等：并发的重复删除请求是安全的。
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_channel(&self, id: Uuid) -> Result<Channel>;

    async fn get_user(&self, id: Uuid) -> Result<User>;

    /// 非私聊频道的规范路径（如 `gps/random`）
    async fn get_channel_path(&self, id: Uuid) -> Result<String>;

    /// 文件元数据；不存在或查询失败时返回 None
    async fn get_file_meta(&self, id: Uuid) -> Option<FileMeta>;

    async fn get_user_ids(&self, query: UsersQuery) -> Result<Vec<Uuid>>;

    /// 将指定频道设为免打扰的用户
    async fn get_mute_user_ids(&self, channel_id: Uuid) -> Result<Vec<Uuid>>;

    async fn get_device_tokens_by_user_id(&self, user_id: Uuid) -> Result<Vec<String>>;

    /// 删除设备令牌（幂等）
    async fn unregister_device(&self, token: &str) -> Result<()>;
}
