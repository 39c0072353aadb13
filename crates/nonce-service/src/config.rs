//! Nonce 服务配置
//!
//! 清理间隔是服务构造配置的一部分，而非进程级全局变量，
//! 因此多个服务实例可以各自独立配置。

use crate::storage::StorageConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 默认清理间隔：24 小时
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Nonce 服务配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NonceServiceConfig {
    /// 存储后端配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// 过期清理任务配置
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

impl NonceServiceConfig {
    /// 验证配置，`Warning:` 开头的条目为非致命问题
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = match self.storage.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };

        if self.sweeper.interval().is_zero() {
            errors.push("Warning: sweeper interval is zero, expired nonces are swept continuously".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// 过期清理任务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// 清理间隔（秒）
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// 毫秒级清理间隔，设置后覆盖 `interval_secs`
    ///
    /// 不设下限，测试中通常设为几十毫秒
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            interval_ms: None,
        }
    }
}

impl SweeperConfig {
    /// 指定精确清理间隔
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval_secs: interval.as_secs(),
            interval_ms: Some(interval.as_millis() as u64),
        }
    }

    /// 实际生效的清理间隔
    pub fn interval(&self) -> Duration {
        match self.interval_ms {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_secs(self.interval_secs),
        }
    }
}

fn default_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageBackend;

    #[test]
    fn test_default_config() {
        let config = NonceServiceConfig::default();
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.sweeper.interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_interval_override() {
        let sweeper = SweeperConfig::with_interval(Duration::from_millis(50));
        assert_eq!(sweeper.interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_deserialize_full_config() {
        let toml_str = r#"
            [storage]
            backend = "memory"

            [sweeper]
            interval_secs = 600
        "#;

        let config: NonceServiceConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.sweeper.interval(), Duration::from_secs(600));
    }

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: NonceServiceConfig = toml::from_str("").unwrap();
        assert_eq!(config.sweeper.interval_secs, DEFAULT_SWEEP_INTERVAL_SECS);
        assert!(config.sweeper.interval_ms.is_none());
    }

    #[test]
    fn test_validate_zero_interval_warns() {
        let config = NonceServiceConfig {
            storage: StorageConfig::default(),
            sweeper: SweeperConfig::with_interval(Duration::ZERO),
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Warning:"));
    }
}
