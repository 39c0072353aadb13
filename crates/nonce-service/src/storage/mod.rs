//! Nonce 存储模块
//!
//! 提供多种存储后端支持：SQLite, PostgreSQL, 内存
//!
//! # 设计
//!
//! - `NonceStoreBackend` trait 定义统一的异步接口
//! - `NonceStorage` enum 封装不同的后端实现
//! - 通过 `StorageConfig` 配置选择和初始化后端

pub mod backend;
pub mod config;
pub mod memory;
pub mod schema;
pub mod sqlite;

#[cfg(feature = "backend-postgres")]
pub mod postgres;

use crate::error::{NonceError, NonceResult};
use crate::types::Nonce;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use backend::NonceStoreBackend;
pub use config::{PostgresConfig, SqliteConfig, StorageBackend, StorageConfig};
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

#[cfg(feature = "backend-postgres")]
pub use postgres::PostgresBackend;

/// Nonce 存储统一接口
///
/// 构造时按配置选定后端，之后在服务与清理任务之间共享（Clone 仅复制句柄）
#[derive(Clone, Debug)]
pub enum NonceStorage {
    /// SQLite 存储后端（始终可用）
    Sqlite(Box<SqliteBackend>),

    /// PostgreSQL 存储后端
    #[cfg(feature = "backend-postgres")]
    Postgres(PostgresBackend),

    /// 进程内存储后端
    Memory(MemoryBackend),
}

impl NonceStorage {
    /// 从配置创建存储实例
    ///
    /// # Errors
    /// - 缺少对应后端的配置
    /// - 后端初始化失败
    /// - 后端功能未启用（feature flag）
    pub async fn from_config(config: &StorageConfig) -> NonceResult<Self> {
        match config.backend {
            StorageBackend::Sqlite => {
                let cfg = config
                    .sqlite
                    .as_ref()
                    .ok_or_else(|| NonceError::Config("Missing SQLite config".into()))?;
                let backend = SqliteBackend::connect(cfg).await?;
                Ok(Self::Sqlite(Box::new(backend)))
            }

            #[cfg(feature = "backend-postgres")]
            StorageBackend::Postgres => {
                let cfg = config
                    .postgres
                    .as_ref()
                    .ok_or_else(|| NonceError::Config("Missing PostgreSQL config".into()))?;
                let backend = PostgresBackend::connect(cfg).await?;
                Ok(Self::Postgres(backend))
            }

            #[cfg(not(feature = "backend-postgres"))]
            StorageBackend::Postgres => Err(NonceError::Config(
                "PostgreSQL backend not enabled. Compile with --features backend-postgres".into(),
            )),

            StorageBackend::Memory => Ok(Self::Memory(MemoryBackend::new())),
        }
    }

    /// 创建内存存储
    pub fn memory() -> Self {
        Self::Memory(MemoryBackend::new())
    }

    /// 按 token 写入或更新 nonce
    pub async fn save(&self, nonce: Nonce) -> NonceResult<Nonce> {
        self.backend().save(nonce).await
    }

    /// 根据 token 查询
    pub async fn get_by_token(&self, token: &str) -> NonceResult<Option<Nonce>> {
        self.backend().get_by_token(token).await
    }

    /// 列出某个 (action, user_id) 下的所有记录
    pub async fn list_by_action_and_user(
        &self,
        action: &str,
        user_id: Uuid,
    ) -> NonceResult<Vec<Nonce>> {
        self.backend().list_by_action_and_user(action, user_id).await
    }

    /// 原子地将未使用的 nonce 标记为已使用
    pub async fn consume_if_unused(&self, token: &str) -> NonceResult<Option<Nonce>> {
        self.backend().consume_if_unused(token).await
    }

    /// 删除过期记录
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> NonceResult<u64> {
        self.backend().delete_expired(now).await
    }

    /// 获取记录总数
    pub async fn count(&self) -> NonceResult<u64> {
        self.backend().count().await
    }

    /// 获取后端类型名称
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "SQLite",

            #[cfg(feature = "backend-postgres")]
            Self::Postgres(_) => "Postgres",

            Self::Memory(_) => "Memory",
        }
    }

    fn backend(&self) -> &dyn NonceStoreBackend {
        match self {
            Self::Sqlite(b) => &**b,

            #[cfg(feature = "backend-postgres")]
            Self::Postgres(b) => b,

            Self::Memory(b) => b,
        }
    }
}
