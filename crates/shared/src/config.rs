//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::observability::ObservabilityConfig;

/// FCM 推送配置
#[derive(Debug, Clone, Deserialize)]
pub struct FcmConfig {
    /// Firebase 服务账号凭证文件路径，启动时必须存在
    pub service_account_file: String,
    /// 构造图标、缩略图、角标 URL 的绝对前缀
    pub origin: String,
}

impl Default for FcmConfig {
    fn default() -> Self {
        Self {
            service_account_file: "serviceAccount.json".to_string(),
            origin: "http://localhost:3000".to_string(),
        }
    }
}

/// 事件总线配置
#[derive(Debug, Clone, Deserialize)]
pub struct EventBusConfig {
    /// 订阅接收缓冲容量
    pub capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// 推送重试配置
///
/// 退避参数以配置数据暴露，测试可将间隔设为零以消除等待。
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub multiplier: f64,
    /// 超过该总时长后放弃该次投递
    pub max_elapsed_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 500,
            max_interval_ms: 60_000,
            multiplier: 1.5,
            max_elapsed_secs: 15 * 60,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub fcm: FcmConfig,
    #[serde(default)]
    pub bus: EventBusConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. 环境变量（CHAT_ 前缀，如 CHAT_FCM_ORIGIN -> fcm.origin）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("CHAT_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{env}.toml"))).required(false),
            )
            .add_source(
                Environment::with_prefix("CHAT")
                    .separator("_")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.bus.capacity, 100);
        assert_eq!(config.retry.initial_interval_ms, 500);
        assert_eq!(config.retry.max_elapsed_secs, 900);
        assert_eq!(config.fcm.origin, "http://localhost:3000");
    }

    #[test]
    fn test_retry_defaults_mirror_backoff_generator() {
        // 与标准指数退避生成器的默认值保持一致
        let retry = RetryConfig::default();
        assert_eq!(retry.initial_interval_ms, 500);
        assert_eq!(retry.max_interval_ms, 60_000);
        assert!((retry.multiplier - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_is_production() {
        let mut config = AppConfig::default();
        assert!(!config.is_production());
        config.environment = "production".to_string();
        assert!(config.is_production());
    }
}
