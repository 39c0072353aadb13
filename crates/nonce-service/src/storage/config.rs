//! 存储后端配置
//!
//! 定义各种存储后端的配置结构

use serde::{Deserialize, Serialize};

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 存储后端类型
    pub backend: StorageBackend,

    /// SQLite 配置（当 backend = "sqlite" 时必需）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlite: Option<SqliteConfig>,

    /// PostgreSQL 配置（当 backend = "postgres" 时必需）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            sqlite: Some(SqliteConfig::default()),
            postgres: None,
        }
    }
}

impl StorageConfig {
    /// 内存存储配置（测试和单进程场景）
    pub fn memory() -> Self {
        Self {
            backend: StorageBackend::Memory,
            sqlite: None,
            postgres: None,
        }
    }

    /// 指定数据库文件的 SQLite 存储配置
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            sqlite: Some(SqliteConfig {
                path: path.into(),
                ..SqliteConfig::default()
            }),
            postgres: None,
        }
    }

    /// 验证配置，返回发现的问题列表
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match self.backend {
            StorageBackend::Sqlite => match &self.sqlite {
                None => errors.push("Missing [storage.sqlite] section for sqlite backend".into()),
                Some(cfg) if cfg.path.trim().is_empty() => {
                    errors.push("SQLite database path cannot be empty".into())
                }
                Some(cfg) if !cfg.provision_schema => errors.push(
                    "Warning: provision_schema = false, the nonce table must already exist"
                        .into(),
                ),
                Some(_) => {}
            },
            StorageBackend::Postgres => {
                if self.postgres.is_none() {
                    errors.push("Missing [storage.postgres] section for postgres backend".into());
                }
                if !cfg!(feature = "backend-postgres") {
                    errors.push(
                        "PostgreSQL backend not enabled. Compile with --features backend-postgres"
                            .into(),
                    );
                }
            }
            StorageBackend::Memory => {
                errors.push("Warning: memory backend does not persist nonces across restarts".into())
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// 存储后端类型枚举
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite 数据库
    Sqlite,
    /// PostgreSQL 数据库
    Postgres,
    /// 进程内存储
    Memory,
}

/// SQLite 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// 数据库文件路径
    pub path: String,

    /// 连接池大小
    #[serde(default = "default_sqlite_pool_size")]
    pub pool_size: u32,

    /// 启动时执行建表语句
    ///
    /// 关闭后要求 nonce 表已由外部迁移工具创建
    #[serde(default = "default_provision_schema")]
    pub provision_schema: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "nonce.db".to_string(),
            pool_size: default_sqlite_pool_size(),
            provision_schema: default_provision_schema(),
        }
    }
}

fn default_sqlite_pool_size() -> u32 {
    10
}

fn default_provision_schema() -> bool {
    true
}

/// PostgreSQL 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// 数据库主机地址
    pub host: String,

    /// 数据库端口
    pub port: u16,

    /// 数据库名称
    pub database: String,

    /// 用户名
    pub username: String,

    /// 密码
    pub password: String,

    /// 连接池大小
    #[serde(default = "default_postgres_pool_size")]
    pub pool_size: u32,

    /// 连接最大生命周期（秒）
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,

    /// 启动时执行建表语句
    #[serde(default = "default_provision_schema")]
    pub provision_schema: bool,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "nonce".to_string(),
            username: "nonce".to_string(),
            password: "".to_string(),
            pool_size: default_postgres_pool_size(),
            max_lifetime_secs: default_max_lifetime_secs(),
            provision_schema: default_provision_schema(),
        }
    }
}

fn default_postgres_pool_size() -> u32 {
    20
}

fn default_max_lifetime_secs() -> u64 {
    3600
}
