//! 通知对象计算
//!
//! 按频道类别计算一条消息应通知的用户集合。三个分支互斥：
//! - 强制通知频道：全部活跃非 bot 用户，不展开提及，不消费免打扰列表
//! - 私有频道（含私聊）：频道成员，同样不展开提及、不消费免打扰列表
//! - 普通频道：订阅者，展开用户/用户组提及后减去免打扰用户
//!
//! 无论哪个分支，发送者本人最后都会被移除。

use std::collections::HashSet;

use uuid::Uuid;

use chat_shared::error::Result;
use chat_shared::models::{Channel, EmbeddedInfo, EmbeddedKind, Message};
use chat_shared::repository::{Repository, UsersQuery};

/// 频道在通知语义下的类别
///
/// 以标签变体而非布尔组合建模，使"免打扰列表只在普通频道生效"
/// 这一不变量由分支结构本身保证。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// 强制通知频道，覆盖用户偏好
    Forced,
    /// 私有频道，仅成员可见（私聊也属于此类）
    Private,
    /// 普通公开频道
    Normal,
}

impl ChannelKind {
    /// 分类优先级：强制 > 私有 > 普通
    pub fn of(channel: &Channel) -> Self {
        if channel.is_forced {
            Self::Forced
        } else if !channel.is_public {
            Self::Private
        } else {
            Self::Normal
        }
    }
}

/// 计算消息的通知对象集合
///
/// 返回去重后的用户 id 集合，顺序无意义。任何仓储错误都会中止
/// 整个事件（调用方丢弃通知）。
pub async fn resolve_targets(
    repo: &dyn Repository,
    message: &Message,
    channel: &Channel,
    embedded: &[EmbeddedInfo],
) -> Result<HashSet<Uuid>> {
    let mut targets: HashSet<Uuid> = HashSet::new();
    let q = UsersQuery::new().active().not_bot();

    match ChannelKind::of(channel) {
        ChannelKind::Forced => {
            targets.extend(repo.get_user_ids(q).await?);
        }
        ChannelKind::Private => {
            targets.extend(repo.get_user_ids(q.c_member_of(channel.id)).await?);
        }
        ChannelKind::Normal => {
            targets.extend(repo.get_user_ids(q.subscriber_of(channel.id)).await?);

            // 提及展开：用户提及直接加入（冻结用户由客户端渲染时替换，
            // 此处不过滤），用户组提及按活跃非 bot 成员展开
            for embed in embedded {
                match embed.kind {
                    EmbeddedKind::User => {
                        targets.insert(embed.id);
                    }
                    EmbeddedKind::Group => {
                        targets.extend(repo.get_user_ids(q.g_member_of(embed.id)).await?);
                    }
                    EmbeddedKind::File => {}
                }
            }

            // 免打扰用户不在普通频道收到推送
            for muted in repo.get_mute_user_ids(channel.id).await? {
                targets.remove(&muted);
            }
        }
    }

    // 发送者不给自己推送
    targets.remove(&message.user_id);

    Ok(targets)
}
