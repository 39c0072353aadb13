//! SQLite 存储后端实现
//!
//! 使用 sqlx 提供原生异步 SQLite 存储支持，每个逻辑操作在单个事务内完成

use crate::error::{NonceError, NonceResult};
use crate::storage::backend::NonceStoreBackend;
use crate::storage::config::SqliteConfig;
use crate::storage::schema;
use crate::types::Nonce;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// 查询列顺序，与 `NonceRow` 对应
const SELECT_COLUMNS: &str =
    "SELECT id, user_id, token, action, salt, is_used, is_valid, created_at, expires_at FROM nonce";

type NonceRow = (
    String,
    String,
    String,
    Option<String>,
    String,
    bool,
    bool,
    i64,
    DateTime<Utc>,
);

/// SQLite 存储后端
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl SqliteBackend {
    /// 创建新的 SQLite 后端实例
    ///
    /// # Arguments
    /// * `config` - SQLite 配置，`path` 为数据库文件路径
    pub async fn connect(config: &SqliteConfig) -> NonceResult<Self> {
        let file = Path::new(&config.path);
        if let Some(parent) = file.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }

        // 创建连接选项并启用 WAL 模式
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", file.display()))
            .map_err(|e| NonceError::Config(format!("Failed to parse SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        // 创建连接池
        let pool = SqlitePoolOptions::new()
            .max_connections(config.pool_size.max(1))
            .connect_with(options)
            .await?;

        if config.provision_schema {
            schema::provision_sqlite(&pool).await?;
        }

        info!(
            "SQLite nonce storage initialized: path={}, provision_schema={}, WAL mode enabled",
            file.display(),
            config.provision_schema
        );

        Ok(Self { pool })
    }

    /// 使用已有连接池创建后端（表结构需已存在）
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 获取连接池
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_nonce(row: NonceRow) -> NonceResult<Nonce> {
    let (id, user_id, token, action, salt, is_used, is_valid, created_at, expires_at) = row;
    Ok(Nonce {
        id: parse_uuid(&id)?,
        user_id: parse_uuid(&user_id)?,
        token,
        action: action.unwrap_or_default(),
        salt,
        is_used,
        is_valid,
        created_at,
        expires_at,
    })
}

fn parse_uuid(value: &str) -> NonceResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| NonceError::Database(sqlx::Error::Decode(Box::new(e))))
}

#[async_trait]
impl NonceStoreBackend for SqliteBackend {
    async fn save(&self, mut nonce: Nonce) -> NonceResult<Nonce> {
        let mut tx = self.pool.begin().await?;

        if nonce.is_unsaved() {
            nonce.id = Uuid::new_v4();
            sqlx::query(
                r#"INSERT INTO nonce
                   (id, user_id, token, action, salt, is_used, is_valid, created_at, expires_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            )
            .bind(nonce.id.to_string())
            .bind(nonce.user_id.to_string())
            .bind(&nonce.token)
            .bind(&nonce.action)
            .bind(&nonce.salt)
            .bind(nonce.is_used)
            .bind(nonce.is_valid)
            .bind(nonce.created_at)
            .bind(nonce.expires_at)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            trace!("Inserted nonce {} into SQLite", nonce.id);
            return Ok(nonce);
        }

        sqlx::query("UPDATE nonce SET is_used = ?1, is_valid = ?2 WHERE id = ?3")
            .bind(nonce.is_used)
            .bind(nonce.is_valid)
            .bind(nonce.id.to_string())
            .execute(&mut *tx)
            .await?;

        let stored = sqlx::query_as::<_, NonceRow>(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(nonce.id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;

        match stored {
            Some(row) => row_to_nonce(row),
            None => Ok(nonce),
        }
    }

    async fn get_by_token(&self, token: &str) -> NonceResult<Option<Nonce>> {
        let row = sqlx::query_as::<_, NonceRow>(&format!("{SELECT_COLUMNS} WHERE token = ?1"))
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_nonce).transpose()
    }

    async fn list_by_action_and_user(
        &self,
        action: &str,
        user_id: Uuid,
    ) -> NonceResult<Vec<Nonce>> {
        let rows = sqlx::query_as::<_, NonceRow>(&format!(
            "{SELECT_COLUMNS} WHERE action = ?1 AND user_id = ?2"
        ))
        .bind(action)
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_nonce).collect()
    }

    async fn consume_if_unused(&self, token: &str) -> NonceResult<Option<Nonce>> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE nonce SET is_used = 1 WHERE token = ?1 AND is_used = 0")
            .bind(token)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.commit().await?;
            return Ok(None);
        }

        let row = sqlx::query_as::<_, NonceRow>(&format!("{SELECT_COLUMNS} WHERE token = ?1"))
            .bind(token)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;

        row.map(row_to_nonce).transpose()
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> NonceResult<u64> {
        let mut tx = self.pool.begin().await?;
        // julianday 统一不同的日期文本格式，并保留小数秒
        let result = sqlx::query("DELETE FROM nonce WHERE julianday(expires_at) < julianday(?1)")
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            debug!("Cleaned up {} expired nonces from SQLite", deleted);
        }
        Ok(deleted)
    }

    async fn count(&self) -> NonceResult<u64> {
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM nonce")
            .fetch_one(&self.pool)
            .await?;
        Ok(total.0 as u64)
    }
}
