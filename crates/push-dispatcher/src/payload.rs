//! 通知负载渲染
//!
//! 从消息、发送者、频道与内嵌引用渲染平台无关的通知负载：
//! 标题、正文（最长 100 个字符）、跳转路径、图标与可选缩略图，
//! 外加 Android / APNs / Webpush 三个平台信封。
//! 序列化结构与 FCM HTTP v1 的 message 字段一一对应。

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;

use chat_shared::error::Result;
use chat_shared::events::MessageCreatedEvent;
use chat_shared::models::{Channel, EmbeddedKind};
use chat_shared::repository::Repository;

/// 通知的存活时间：两天
pub const MESSAGE_TTL_SECS: i64 = 60 * 60 * 24 * 2;

/// 正文的最大字符数（按 Unicode 码点计）
const BODY_MAX_CHARS: usize = 100;

/// 平台无关的通知负载
///
/// `data` 为推送到客户端的键值对，键集合固定（image 仅在存在带
/// 缩略图的文件附件时出现）；三个平台信封控制各端的投递行为。
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub data: HashMap<String, String>,
    pub android: AndroidConfig,
    pub apns: ApnsConfig,
    pub webpush: WebpushConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct AndroidConfig {
    pub priority: String,
    /// FCM v1 将 Duration 序列化为 "<秒数>s"
    pub ttl: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApnsConfig {
    pub headers: HashMap<String, String>,
    pub payload: ApnsPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApnsPayload {
    pub aps: Aps,
}

#[derive(Debug, Clone, Serialize)]
pub struct Aps {
    pub alert: ApsAlert,
    pub sound: String,
    #[serde(rename = "thread-id")]
    pub thread_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApsAlert {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebpushConfig {
    pub headers: HashMap<String, String>,
}

/// 渲染一条消息的通知负载
///
/// 发送者、频道路径与文件元数据按需从仓储解析；任何仓储错误都会
/// 中止整个事件的渲染（调用方记录日志并丢弃通知，不做部分发送）。
pub async fn render(
    repo: &dyn Repository,
    origin: &str,
    channel: &Channel,
    event: &MessageCreatedEvent,
) -> Result<NotificationPayload> {
    let mut author = repo.get_user(event.message.user_id).await?;
    if author.display_name.is_empty() {
        author.display_name = author.name.clone();
    }

    let mut data = HashMap::from([
        ("title".to_string(), "traQ".to_string()),
        (
            "icon".to_string(),
            format!(
                "{origin}/api/1.0/public/icon/{}",
                percent_encode_hash(&author.name)
            ),
        ),
        ("vibration".to_string(), "[1000, 1000, 1000]".to_string()),
        ("tag".to_string(), format!("c:{}", event.message.channel_id)),
        ("badge".to_string(), format!("{origin}/static/badge.png")),
    ]);

    let body;
    if channel.is_dm {
        data.insert("title".to_string(), format!("@{}", author.display_name));
        data.insert("path".to_string(), format!("/users/{}", author.name));
        body = event.plain.clone();
    } else {
        let path = repo.get_channel_path(event.message.channel_id).await?;
        data.insert("title".to_string(), format!("#{path}"));
        data.insert("path".to_string(), format!("/channels/{path}"));
        body = format!("{}: {}", author.display_name, event.plain);
    }
    data.insert("body".to_string(), truncate_body(&body));

    // 第一个带缩略图的文件附件作为通知配图
    for embed in &event.embedded {
        if embed.kind != EmbeddedKind::File {
            continue;
        }
        if let Some(meta) = repo.get_file_meta(embed.id).await
            && meta.has_thumbnail
        {
            data.insert(
                "image".to_string(),
                format!("{origin}/api/1.0/files/{}/thumbnail", embed.id),
            );
            break;
        }
    }

    let title = data["title"].clone();
    let rendered_body = data["body"].clone();
    let tag = data["tag"].clone();

    Ok(NotificationPayload {
        data,
        android: AndroidConfig {
            priority: "high".to_string(),
            ttl: format!("{MESSAGE_TTL_SECS}s"),
        },
        apns: ApnsConfig {
            headers: HashMap::from([(
                "apns-expiration".to_string(),
                (Utc::now().timestamp() + MESSAGE_TTL_SECS).to_string(),
            )]),
            payload: ApnsPayload {
                aps: Aps {
                    alert: ApsAlert {
                        title,
                        body: rendered_body,
                    },
                    sound: "default".to_string(),
                    thread_id: tag,
                },
            },
        },
        webpush: WebpushConfig {
            headers: HashMap::from([("TTL".to_string(), MESSAGE_TTL_SECS.to_string())]),
        },
    })
}

/// 截断正文到最多 100 个字符
///
/// 超长时保留前 97 个字符并以 `...` 结尾，按 Unicode 码点切分，
/// 不会截断多字节字符。
fn truncate_body(body: &str) -> String {
    if body.chars().count() <= BODY_MAX_CHARS {
        return body.to_string();
    }
    let mut truncated: String = body.chars().take(BODY_MAX_CHARS - 3).collect();
    truncated.push_str("...");
    truncated
}

/// 用户名中只有 `#` 需要转义（URL 片段分隔符），其余字符原样保留
fn percent_encode_hash(name: &str) -> String {
    name.replace('#', "%23")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MemoryRepository;
    use chat_shared::models::{EmbeddedInfo, Message, User};
    use chrono::Utc;
    use uuid::Uuid;

    const ORIGIN: &str = "https://chat.example.com";

    fn make_user(name: &str, display_name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            display_name: display_name.to_string(),
            is_active: true,
            is_bot: false,
        }
    }

    fn make_channel(is_dm: bool) -> Channel {
        Channel {
            id: Uuid::new_v4(),
            is_public: !is_dm,
            is_forced: false,
            is_dm,
        }
    }

    fn make_event(author: &User, channel: &Channel, plain: &str) -> MessageCreatedEvent {
        MessageCreatedEvent {
            message: Message {
                id: Uuid::new_v4(),
                channel_id: channel.id,
                user_id: author.id,
                created_at: Utc::now(),
            },
            plain: plain.to_string(),
            embedded: vec![],
        }
    }

    #[tokio::test]
    async fn test_dm_payload() {
        let repo = MemoryRepository::new();
        let alice = make_user("alice", "");
        repo.insert_user(alice.clone());
        let channel = make_channel(true);

        let event = make_event(&alice, &channel, "hi");
        let payload = render(&repo, ORIGIN, &channel, &event).await.unwrap();

        assert_eq!(payload.data["title"], "@alice");
        assert_eq!(payload.data["path"], "/users/alice");
        assert_eq!(payload.data["body"], "hi");
    }

    #[tokio::test]
    async fn test_public_channel_payload() {
        let repo = MemoryRepository::new();
        let bob = make_user("bob", "Bob");
        repo.insert_user(bob.clone());
        let channel = make_channel(false);
        repo.set_channel_path(channel.id, "gps/random");

        let event = make_event(&bob, &channel, "yo");
        let payload = render(&repo, ORIGIN, &channel, &event).await.unwrap();

        assert_eq!(payload.data["title"], "#gps/random");
        assert_eq!(payload.data["path"], "/channels/gps/random");
        assert_eq!(payload.data["body"], "Bob: yo");
    }

    #[tokio::test]
    async fn test_fixed_data_fields() {
        let repo = MemoryRepository::new();
        let alice = make_user("alice", "Alice");
        repo.insert_user(alice.clone());
        let channel = make_channel(true);

        let event = make_event(&alice, &channel, "hi");
        let payload = render(&repo, ORIGIN, &channel, &event).await.unwrap();

        assert_eq!(payload.data["vibration"], "[1000, 1000, 1000]");
        assert_eq!(
            payload.data["tag"],
            format!("c:{}", event.message.channel_id)
        );
        assert_eq!(
            payload.data["badge"],
            "https://chat.example.com/static/badge.png"
        );
        assert_eq!(
            payload.data["icon"],
            "https://chat.example.com/api/1.0/public/icon/alice"
        );
        assert!(!payload.data.contains_key("image"));
    }

    #[tokio::test]
    async fn test_hash_in_name_is_escaped_in_icon_url() {
        let repo = MemoryRepository::new();
        let user = make_user("foo#1", "Foo");
        repo.insert_user(user.clone());
        let channel = make_channel(true);

        let event = make_event(&user, &channel, "hi");
        let payload = render(&repo, ORIGIN, &channel, &event).await.unwrap();

        let icon = &payload.data["icon"];
        assert_eq!(icon.matches("foo%231").count(), 1);
        assert!(!icon.contains('#'));
        // 跳转路径使用原始用户名
        assert_eq!(payload.data["path"], "/users/foo#1");
    }

    #[tokio::test]
    async fn test_body_exactly_100_chars_unchanged() {
        let repo = MemoryRepository::new();
        let alice = make_user("alice", "");
        repo.insert_user(alice.clone());
        let channel = make_channel(true);

        let plain = "a".repeat(100);
        let event = make_event(&alice, &channel, &plain);
        let payload = render(&repo, ORIGIN, &channel, &event).await.unwrap();

        assert_eq!(payload.data["body"], plain);
    }

    #[tokio::test]
    async fn test_body_101_chars_truncated() {
        let repo = MemoryRepository::new();
        let alice = make_user("alice", "");
        repo.insert_user(alice.clone());
        let channel = make_channel(true);

        let plain = "a".repeat(101);
        let event = make_event(&alice, &channel, &plain);
        let payload = render(&repo, ORIGIN, &channel, &event).await.unwrap();

        let body = &payload.data["body"];
        assert_eq!(body.chars().count(), 100);
        assert_eq!(&body[..97], &plain[..97]);
        assert!(body.ends_with("..."));
    }

    #[tokio::test]
    async fn test_body_150_ascii_chars_in_dm() {
        let repo = MemoryRepository::new();
        let alice = make_user("alice", "");
        repo.insert_user(alice.clone());
        let channel = make_channel(true);

        let event = make_event(&alice, &channel, &"x".repeat(150));
        let payload = render(&repo, ORIGIN, &channel, &event).await.unwrap();

        let body = &payload.data["body"];
        assert_eq!(body.len(), 100);
        assert!(body.ends_with("..."));
    }

    #[tokio::test]
    async fn test_body_truncation_is_codepoint_safe() {
        let repo = MemoryRepository::new();
        let alice = make_user("alice", "");
        repo.insert_user(alice.clone());
        let channel = make_channel(true);

        // 每个字符 3 字节，按字节截断会撕裂字符
        let plain = "あ".repeat(120);
        let event = make_event(&alice, &channel, &plain);
        let payload = render(&repo, ORIGIN, &channel, &event).await.unwrap();

        let body = &payload.data["body"];
        assert_eq!(body.chars().count(), 100);
        assert_eq!(body.chars().take(97).collect::<String>(), "あ".repeat(97));
        assert!(body.ends_with("..."));
    }

    #[tokio::test]
    async fn test_image_uses_first_thumbnailed_file() {
        let repo = MemoryRepository::new();
        let alice = make_user("alice", "");
        repo.insert_user(alice.clone());
        let channel = make_channel(true);

        let plain_file = Uuid::new_v4();
        let thumb_file = Uuid::new_v4();
        repo.insert_file(plain_file, false);
        repo.insert_file(thumb_file, true);

        let mut event = make_event(&alice, &channel, "pics");
        event.embedded = vec![
            EmbeddedInfo {
                kind: EmbeddedKind::File,
                id: plain_file,
            },
            EmbeddedInfo {
                kind: EmbeddedKind::File,
                id: thumb_file,
            },
        ];

        let payload = render(&repo, ORIGIN, &channel, &event).await.unwrap();
        assert_eq!(
            payload.data["image"],
            format!("https://chat.example.com/api/1.0/files/{thumb_file}/thumbnail")
        );
    }

    #[tokio::test]
    async fn test_missing_file_meta_is_skipped() {
        let repo = MemoryRepository::new();
        let alice = make_user("alice", "");
        repo.insert_user(alice.clone());
        let channel = make_channel(true);

        let mut event = make_event(&alice, &channel, "ghost file");
        event.embedded = vec![EmbeddedInfo {
            kind: EmbeddedKind::File,
            id: Uuid::new_v4(),
        }];

        let payload = render(&repo, ORIGIN, &channel, &event).await.unwrap();
        assert!(!payload.data.contains_key("image"));
    }

    #[tokio::test]
    async fn test_platform_envelopes() {
        let repo = MemoryRepository::new();
        let alice = make_user("alice", "Alice");
        repo.insert_user(alice.clone());
        let channel = make_channel(true);

        let before = Utc::now().timestamp();
        let event = make_event(&alice, &channel, "hi");
        let payload = render(&repo, ORIGIN, &channel, &event).await.unwrap();
        let after = Utc::now().timestamp();

        assert_eq!(payload.android.priority, "high");
        assert_eq!(payload.android.ttl, "172800s");
        assert_eq!(payload.webpush.headers["TTL"], "172800");

        let aps = &payload.apns.payload.aps;
        assert_eq!(aps.alert.title, payload.data["title"]);
        assert_eq!(aps.alert.body, payload.data["body"]);
        assert_eq!(aps.sound, "default");
        assert_eq!(aps.thread_id, payload.data["tag"]);

        let expiration: i64 = payload.apns.headers["apns-expiration"].parse().unwrap();
        assert!(expiration >= before + MESSAGE_TTL_SECS);
        assert!(expiration <= after + MESSAGE_TTL_SECS);
    }

    #[tokio::test]
    async fn test_serialized_shape_matches_fcm_v1() {
        let repo = MemoryRepository::new();
        let alice = make_user("alice", "Alice");
        repo.insert_user(alice.clone());
        let channel = make_channel(true);

        let event = make_event(&alice, &channel, "hi");
        let payload = render(&repo, ORIGIN, &channel, &event).await.unwrap();

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["android"]["priority"], "high");
        assert_eq!(json["android"]["ttl"], "172800s");
        assert_eq!(json["apns"]["payload"]["aps"]["sound"], "default");
        assert!(json["apns"]["payload"]["aps"]["thread-id"].is_string());
        assert_eq!(json["webpush"]["headers"]["TTL"], "172800");
    }

    #[tokio::test]
    async fn test_missing_author_aborts_render() {
        let repo = MemoryRepository::new();
        let channel = make_channel(true);
        let ghost = make_user("ghost", "");

        let event = make_event(&ghost, &channel, "hi");
        assert!(render(&repo, ORIGIN, &channel, &event).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_channel_path_aborts_render() {
        let repo = MemoryRepository::new();
        let alice = make_user("alice", "");
        repo.insert_user(alice.clone());
        let channel = make_channel(false);
        // 未登记频道路径

        let event = make_event(&alice, &channel, "hi");
        assert!(render(&repo, ORIGIN, &channel, &event).await.is_err());
    }
}
