//! 重试策略
//!
//! 提供指数退避的等待时间计算，用于瞬时故障（推送服务不可用、
//! 速率超限等）的自动恢复。是否重试由调用方根据错误分类决定，
//! 本模块只负责退避节奏与放弃时机。

use std::time::Duration;

use crate::config::RetryConfig;

/// 指数退避策略
///
/// 第 N 次重试等待 `initial_interval * multiplier^N`，不超过
/// `max_interval`；自首次尝试起累计耗时超过 `max_elapsed` 后放弃。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 首次重试前的等待时间
    pub initial_interval: Duration,
    /// 退避时间上限
    pub max_interval: Duration,
    /// 每次重试的退避倍数
    pub multiplier: f64,
    /// 放弃前允许的总耗时
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    /// 默认策略：初始 500 毫秒，上限 60 秒，倍数 1.5，最长持续 15 分钟
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(60),
            multiplier: 1.5,
            max_elapsed: Duration::from_secs(15 * 60),
        }
    }
}

impl RetryPolicy {
    /// 计算第 N 次重试的等待时间（attempt 从 0 开始）
    ///
    /// 使用 f64 运算后转回 Duration，接受微秒级精度损失。
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_interval.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(attempt as i32);
        let capped_ms = delay_ms.min(self.max_interval.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// 是否应继续重试
    ///
    /// elapsed 为自首次尝试起的累计耗时。
    pub fn should_retry(&self, elapsed: Duration) -> bool {
        elapsed < self.max_elapsed
    }

    /// 测试用策略：不等待，但允许在给定总时长内重试
    pub fn no_wait(max_elapsed: Duration) -> Self {
        Self {
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            multiplier: 1.0,
            max_elapsed,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            max_interval: Duration::from_millis(config.max_interval_ms),
            multiplier: config.multiplier,
            max_elapsed: Duration::from_secs(config.max_elapsed_secs),
        }
    }
}
