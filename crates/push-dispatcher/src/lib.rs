//! 推送通知分发器
//!
//! 订阅进程内事件总线上的消息创建事件，计算应收到通知的用户集合，
//! 渲染平台无关的通知负载，并发地将推送投递到每个用户的各个设备。
//! 瞬时故障按指数退避重试，推送服务报告失效的设备令牌会被回收。

pub mod client;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod fcm;
pub mod payload;
pub mod targets;
pub mod test_utils;
