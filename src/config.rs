//! 应用配置
//!
//! 单个 TOML 文件同时描述 nonce 服务（存储、清理任务）与日志输出。

use crate::error::{Error, Result};
use nonce_service::{NonceServiceConfig, StorageConfig, SweeperConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// nonce-keeper 配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 存储后端配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// 过期清理任务配置
    #[serde(default)]
    pub sweeper: SweeperConfig,

    /// 可观测性配置
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// 可观测性配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ObservabilityConfig {
    /// 过滤级别
    ///
    /// 支持 EnvFilter 语法（如 "info,sqlx=warn"）。默认值 "info"。
    #[serde(default = "default_filter_level")]
    pub filter_level: String,

    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    /// 日志输出目标
    ///
    /// - "console": 输出到标准错误（默认）
    /// - "file": 输出到文件
    #[serde(default = "default_log_output")]
    pub output: String,

    /// 按天轮转日志文件，仅 output = "file" 时有效
    #[serde(default)]
    pub rotate: bool,

    /// 日志目录，仅 output = "file" 时有效
    #[serde(default = "default_log_path")]
    pub path: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            filter_level: default_filter_level(),
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: default_log_output(),
            rotate: false,
            path: default_log_path(),
        }
    }
}

fn default_log_output() -> String {
    "console".to_string()
}

fn default_log_path() -> String {
    "logs/".to_string()
}

fn default_filter_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(Error::Config(format!(
                "Configuration file does not exist: {path_ref:?}"
            )));
        }
        if !path_ref.is_file() {
            return Err(Error::Config(format!(
                "Path is not a valid file: {path_ref:?}"
            )));
        }

        let content = std::fs::read_to_string(path_ref)?;
        Ok(toml::from_str(&content)?)
    }

    /// 组装 nonce 服务配置
    pub fn service_config(&self) -> NonceServiceConfig {
        NonceServiceConfig {
            storage: self.storage.clone(),
            sweeper: self.sweeper.clone(),
        }
    }

    /// 验证配置，`Warning:` 开头的条目为非致命问题
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = match self.service_config().validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };

        match self.observability.log.output.as_str() {
            "console" | "file" => {}
            other => errors.push(format!(
                "observability.log.output must be \"console\" or \"file\", got \"{other}\""
            )),
        }

        if self.observability.log.output == "file" && self.observability.log.path.trim().is_empty()
        {
            errors.push("observability.log.path cannot be empty when output = \"file\"".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
