//! 测试工具模块
//!
//! 提供内存仓储与脚本化推送客户端两个 mock 实现，以及若干测试
//! 辅助函数，供单元测试与集成测试复用，无需任何外部依赖。

use std::collections::{HashMap, HashSet, VecDeque};
use std::collections::hash_map::Entry;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use chat_shared::error::{ChatError, Result};
use chat_shared::models::{Channel, FileMeta, User};
use chat_shared::repository::{Repository, UsersQuery};

use crate::client::{PushClient, SendError};
use crate::payload::{
    AndroidConfig, Aps, ApsAlert, ApnsConfig, ApnsPayload, NotificationPayload, WebpushConfig,
};

// ==================== 内存仓储 ====================

/// 内存仓储
///
/// 以哈希表模拟各实体表，另提供若干故障开关用于验证错误路径。
/// `unregister_device` 记录每次调用，便于断言回收的幂等性。
/// 内部使用同步 Mutex：锁不跨越 await 点，访问方法保持同步，
/// 测试可在轮询断言中直接读取状态。
#[derive(Default)]
pub struct MemoryRepository {
    channels: Mutex<HashMap<Uuid, Channel>>,
    users: Mutex<HashMap<Uuid, User>>,
    channel_paths: Mutex<HashMap<Uuid, String>>,
    files: Mutex<HashMap<Uuid, FileMeta>>,
    /// 频道 -> 订阅者
    subscribers: Mutex<HashMap<Uuid, Vec<Uuid>>>,
    /// 私有频道 -> 成员
    members: Mutex<HashMap<Uuid, Vec<Uuid>>>,
    /// 用户组 -> 成员
    group_members: Mutex<HashMap<Uuid, Vec<Uuid>>>,
    /// 频道 -> 免打扰用户
    mutes: Mutex<HashMap<Uuid, Vec<Uuid>>>,
    /// 用户 -> 设备令牌
    devices: Mutex<HashMap<Uuid, Vec<String>>>,
    /// 每次回收调用的令牌记录（含重复调用）
    unregister_calls: Mutex<Vec<String>>,

    fail_unregister: Mutex<bool>,
    fail_user_ids: Mutex<bool>,
    fail_device_lookup: Mutex<HashSet<Uuid>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn insert_channel(&self, channel: Channel) {
        self.channels.lock().unwrap().insert(channel.id, channel);
    }

    pub fn set_channel_path(&self, channel_id: Uuid, path: &str) {
        self.channel_paths
            .lock()
            .unwrap()
            .insert(channel_id, path.to_string());
    }

    pub fn insert_file(&self, id: Uuid, has_thumbnail: bool) {
        self.files
            .lock()
            .unwrap()
            .insert(id, FileMeta { id, has_thumbnail });
    }

    pub fn subscribe(&self, channel_id: Uuid, user_id: Uuid) {
        self.subscribers
            .lock()
            .unwrap()
            .entry(channel_id)
            .or_default()
            .push(user_id);
    }

    pub fn add_member(&self, channel_id: Uuid, user_id: Uuid) {
        self.members
            .lock()
            .unwrap()
            .entry(channel_id)
            .or_default()
            .push(user_id);
    }

    pub fn add_group_member(&self, group_id: Uuid, user_id: Uuid) {
        self.group_members
            .lock()
            .unwrap()
            .entry(group_id)
            .or_default()
            .push(user_id);
    }

    pub fn mute(&self, channel_id: Uuid, user_id: Uuid) {
        self.mutes
            .lock()
            .unwrap()
            .entry(channel_id)
            .or_default()
            .push(user_id);
    }

    pub fn add_device(&self, user_id: Uuid, token: &str) {
        self.devices
            .lock()
            .unwrap()
            .entry(user_id)
            .or_default()
            .push(token.to_string());
    }

    /// 后续的 `unregister_device` 调用返回错误
    pub fn fail_unregister(&self) {
        *self.fail_unregister.lock().unwrap() = true;
    }

    /// 后续的 `get_user_ids` 调用返回错误
    pub fn fail_user_ids(&self) {
        *self.fail_user_ids.lock().unwrap() = true;
    }

    /// 指定用户的设备令牌查询返回错误
    pub fn fail_device_lookup_for(&self, user_id: Uuid) {
        self.fail_device_lookup.lock().unwrap().insert(user_id);
    }

    /// 指定令牌被回收的次数
    pub fn unregister_count(&self, token: &str) -> usize {
        self.unregister_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.as_str() == token)
            .count()
    }

    /// 全部回收调用记录
    pub fn unregistered(&self) -> Vec<String> {
        self.unregister_calls.lock().unwrap().clone()
    }

    /// 指定用户当前持有的设备令牌
    pub fn devices_of(&self, user_id: Uuid) -> Vec<String> {
        self.devices
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    fn matches_filters(&self, user_id: Uuid, query: &UsersQuery) -> bool {
        if !query.active && !query.not_bot {
            return true;
        }
        let users = self.users.lock().unwrap();
        let Some(user) = users.get(&user_id) else {
            return false;
        };
        (!query.active || user.is_active) && (!query.not_bot || !user.is_bot)
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_channel(&self, id: Uuid) -> Result<Channel> {
        self.channels
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| ChatError::not_found("Channel", id))
    }

    async fn get_user(&self, id: Uuid) -> Result<User> {
        self.users
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| ChatError::not_found("User", id))
    }

    async fn get_channel_path(&self, id: Uuid) -> Result<String> {
        self.channel_paths
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| ChatError::not_found("ChannelPath", id))
    }

    async fn get_file_meta(&self, id: Uuid) -> Option<FileMeta> {
        self.files.lock().unwrap().get(&id).cloned()
    }

    async fn get_user_ids(&self, query: UsersQuery) -> Result<Vec<Uuid>> {
        if *self.fail_user_ids.lock().unwrap() {
            return Err(ChatError::Repository("模拟用户查询故障".to_string()));
        }

        let base: Vec<Uuid> = if let Some(channel_id) = query.c_member_of {
            self.members
                .lock()
                .unwrap()
                .get(&channel_id)
                .cloned()
                .unwrap_or_default()
        } else if let Some(channel_id) = query.subscriber_of {
            self.subscribers
                .lock()
                .unwrap()
                .get(&channel_id)
                .cloned()
                .unwrap_or_default()
        } else if let Some(group_id) = query.g_member_of {
            self.group_members
                .lock()
                .unwrap()
                .get(&group_id)
                .cloned()
                .unwrap_or_default()
        } else {
            self.users.lock().unwrap().keys().copied().collect()
        };

        Ok(base
            .into_iter()
            .filter(|id| self.matches_filters(*id, &query))
            .collect())
    }

    async fn get_mute_user_ids(&self, channel_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .mutes
            .lock()
            .unwrap()
            .get(&channel_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_device_tokens_by_user_id(&self, user_id: Uuid) -> Result<Vec<String>> {
        if self.fail_device_lookup.lock().unwrap().contains(&user_id) {
            return Err(ChatError::Repository("模拟设备令牌查询故障".to_string()));
        }
        Ok(self
            .devices
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn unregister_device(&self, token: &str) -> Result<()> {
        if *self.fail_unregister.lock().unwrap() {
            return Err(ChatError::Repository("模拟令牌回收故障".to_string()));
        }

        self.unregister_calls.lock().unwrap().push(token.to_string());

        // 按令牌删除，天然幂等
        for tokens in self.devices.lock().unwrap().values_mut() {
            tokens.retain(|t| t != token);
        }
        Ok(())
    }
}

// ==================== 脚本化推送客户端 ====================

/// 脚本化推送客户端
///
/// 为每个令牌预设一个结果队列，send 依次弹出；队列耗尽后返回成功。
/// 所有调用均被记录，测试据此断言调用次数与顺序。
#[derive(Default)]
pub struct ScriptedPushClient {
    scripts: Mutex<HashMap<String, VecDeque<std::result::Result<(), SendError>>>>,
    calls: Mutex<Vec<(String, NotificationPayload)>>,
}

impl ScriptedPushClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预设指定令牌的发送结果序列
    pub fn script(
        &self,
        token: &str,
        outcomes: Vec<std::result::Result<(), SendError>>,
    ) {
        self.scripts
            .lock()
            .unwrap()
            .insert(token.to_string(), outcomes.into());
    }

    /// 指定令牌被调用的次数
    pub fn calls_for(&self, token: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == token)
            .count()
    }

    /// 全部调用次数
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// 按调用顺序返回令牌序列
    pub fn sent_tokens(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }

    /// 指定令牌最近一次收到的负载
    pub fn last_payload_for(&self, token: &str) -> Option<NotificationPayload> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(t, _)| t == token)
            .map(|(_, p)| p.clone())
    }
}

#[async_trait]
impl PushClient for ScriptedPushClient {
    async fn send(
        &self,
        token: &str,
        payload: &NotificationPayload,
    ) -> std::result::Result<(), SendError> {
        self.calls
            .lock()
            .unwrap()
            .push((token.to_string(), payload.clone()));

        let mut scripts = self.scripts.lock().unwrap();
        match scripts.entry(token.to_string()) {
            Entry::Occupied(mut entry) => entry.get_mut().pop_front().unwrap_or(Ok(())),
            Entry::Vacant(_) => Ok(()),
        }
    }
}

// ==================== 测试辅助 ====================

/// 构造一个最小的通知负载，字段内容与具体测试无关
pub fn test_payload() -> NotificationPayload {
    NotificationPayload {
        data: HashMap::from([
            ("title".to_string(), "@tester".to_string()),
            ("body".to_string(), "test message".to_string()),
            ("tag".to_string(), "c:test".to_string()),
        ]),
        android: AndroidConfig {
            priority: "high".to_string(),
            ttl: "172800s".to_string(),
        },
        apns: ApnsConfig {
            headers: HashMap::new(),
            payload: ApnsPayload {
                aps: Aps {
                    alert: ApsAlert {
                        title: "@tester".to_string(),
                        body: "test message".to_string(),
                    },
                    sound: "default".to_string(),
                    thread_id: "c:test".to_string(),
                },
            },
        },
        webpush: WebpushConfig {
            headers: HashMap::new(),
        },
    }
}

/// 轮询断言：在超时前等待条件成立
///
/// 分发器的投递任务是后台 spawn 的，测试通过轮询 mock 状态等待
/// 其完成。超时即 panic，给出描述信息。
pub async fn eventually(description: &str, condition: impl Fn() -> bool) {
    let deadline = Duration::from_secs(2);
    let result = tokio::time::timeout(deadline, async {
        loop {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    if result.is_err() {
        panic!("等待超时: {description}");
    }
}
