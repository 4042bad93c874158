//! 进程内事件总线
//!
//! 宿主服务器各子系统之间的类型化发布/订阅通道。基于
//! `tokio::sync::broadcast` 实现：发布方不等待订阅方，接收缓冲有界，
//! 消费过慢的订阅者会收到 `Lagged` 并丢失最早的事件。

use tokio::sync::broadcast;

use crate::models::{EmbeddedInfo, Message};

/// 默认的订阅接收缓冲容量
pub const DEFAULT_BUS_CAPACITY: usize = 100;

/// 消息创建事件的载荷
#[derive(Debug, Clone)]
pub struct MessageCreatedEvent {
    pub message: Message,
    /// 已渲染的纯文本正文
    pub plain: String,
    /// 上游解析器抽取的内嵌引用
    pub embedded: Vec<EmbeddedInfo>,
}

/// 总线上流通的事件
///
/// 枚举变体即事件类型，字段缺失或类型不匹配在编译期即不可表达。
#[derive(Debug, Clone)]
pub enum Event {
    MessageCreated(MessageCreatedEvent),
}

/// 事件总线
///
/// 内部为 broadcast sender，Clone 后各持有方共享同一通道。
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// 创建指定接收缓冲容量的总线
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// 发布事件，返回当前收到该事件的订阅者数量
    ///
    /// 没有订阅者时事件被丢弃而非报错：推送是尽力而为的旁路功能，
    /// 不应反向影响发布方。
    pub fn publish(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// 订阅总线，从订阅时刻起接收后续事件
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
