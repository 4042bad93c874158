//! 推送分发器
//!
//! 持有事件总线订阅与各依赖，驱动三层并发结构：
//! 1. 监听任务：单任务消费订阅通道，只负责派生下一层任务
//! 2. 事件任务：每条消息一个任务，渲染负载并计算通知对象
//! 3. 投递任务：每名通知对象一个任务，串行处理其设备令牌
//!
//! 事件之间、同一事件的通知对象之间均无顺序保证。进程退出时
//! 在途投递随之丢弃（推送为尽力而为）。

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use chat_shared::config::AppConfig;
use chat_shared::events::{Event, EventBus, MessageCreatedEvent};
use chat_shared::repository::Repository;
use chat_shared::retry::RetryPolicy;

use crate::client::PushClient;
use crate::delivery::deliver_to_user;
use crate::payload;
use crate::targets::resolve_targets;

/// 推送分发器
///
/// 所有依赖经构造函数显式注入；启动后除仓储中的设备令牌表外
/// 不再有可变共享状态。
#[derive(Clone)]
pub struct PushDispatcher {
    repo: Arc<dyn Repository>,
    client: Arc<dyn PushClient>,
    bus: EventBus,
    origin: String,
    retry: RetryPolicy,
}

impl PushDispatcher {
    pub fn new(
        repo: Arc<dyn Repository>,
        client: Arc<dyn PushClient>,
        bus: EventBus,
        config: &AppConfig,
    ) -> Self {
        Self {
            repo,
            client,
            bus,
            origin: config.fcm.origin.clone(),
            retry: RetryPolicy::from(&config.retry),
        }
    }

    /// 启动监听任务
    ///
    /// 返回监听任务的句柄。关闭信号只停止监听循环；
    /// 已派生的事件任务与投递任务不被取消。
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();

        tokio::spawn(async move {
            info!("推送分发器已启动");

            loop {
                tokio::select! {
                    // 偏向关闭信号，保证收到关闭时能尽快退出
                    biased;

                    changed = shutdown.changed() => {
                        // 发送端被丢弃等同于进程关闭
                        if changed.is_err() || *shutdown.borrow() {
                            info!("收到关闭信号，推送分发器退出");
                            break;
                        }
                    }

                    event = rx.recv() => {
                        match event {
                            Ok(Event::MessageCreated(ev)) => {
                                let dispatcher = self.clone();
                                tokio::spawn(async move {
                                    dispatcher.process_message_created(ev).await;
                                });
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(skipped, "事件消费过慢，部分消息的推送被跳过");
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                warn!("事件总线已关闭，推送分发器退出");
                                break;
                            }
                        }
                    }
                }
            }
        })
    }

    /// 处理单条消息创建事件
    ///
    /// 渲染与对象计算阶段的任何仓储错误都会丢弃整个事件，
    /// 不做部分投递。
    async fn process_message_created(&self, event: MessageCreatedEvent) {
        let message_id = event.message.id;

        let channel = match self.repo.get_channel(event.message.channel_id).await {
            Ok(channel) => channel,
            Err(e) => {
                error!(
                    error = %e,
                    message_id = %message_id,
                    channel_id = %event.message.channel_id,
                    "获取频道失败，丢弃该事件"
                );
                return;
            }
        };

        let payload = match payload::render(self.repo.as_ref(), &self.origin, &channel, &event).await
        {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, message_id = %message_id, "渲染通知负载失败，丢弃该事件");
                return;
            }
        };

        let targets =
            match resolve_targets(self.repo.as_ref(), &event.message, &channel, &event.embedded)
                .await
            {
                Ok(targets) => targets,
                Err(e) => {
                    error!(error = %e, message_id = %message_id, "计算通知对象失败，丢弃该事件");
                    return;
                }
            };

        debug!(
            message_id = %message_id,
            target_count = targets.len(),
            "通知对象计算完成"
        );

        let payload = Arc::new(payload);
        for user_id in targets {
            tokio::spawn(deliver_to_user(
                self.repo.clone(),
                self.client.clone(),
                self.retry.clone(),
                user_id,
                payload.clone(),
            ));
        }
    }
}
