//! PostgreSQL 存储后端实现
//!
//! 使用 sqlx 提供 PostgreSQL 存储支持

use crate::error::NonceResult;
use crate::storage::backend::NonceStoreBackend;
use crate::storage::config::PostgresConfig;
use crate::storage::schema;
use crate::types::Nonce;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info, trace};
use uuid::Uuid;

const SELECT_COLUMNS: &str =
    "SELECT id, user_id, token, action, salt, is_used, is_valid, created_at, expires_at FROM nonce";

const RETURNING_COLUMNS: &str =
    "RETURNING id, user_id, token, action, salt, is_used, is_valid, created_at, expires_at";

type NonceRow = (
    Uuid,
    Uuid,
    String,
    Option<String>,
    String,
    bool,
    bool,
    i64,
    DateTime<Utc>,
);

/// PostgreSQL 存储后端
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl PostgresBackend {
    /// 创建新的 PostgreSQL 后端实例
    pub async fn connect(config: &PostgresConfig) -> NonceResult<Self> {
        // 构建连接 URL
        let url = format!(
            "postgres://{}:{}@{}:{}/{}",
            config.username, config.password, config.host, config.port, config.database
        );

        // 创建连接池
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&url)
            .await?;

        if config.provision_schema {
            schema::provision_postgres(&pool).await?;
        }

        info!(
            "PostgreSQL nonce storage initialized: host={}:{}, db={}",
            config.host, config.port, config.database
        );

        Ok(Self { pool })
    }
}

fn row_to_nonce(row: NonceRow) -> Nonce {
    let (id, user_id, token, action, salt, is_used, is_valid, created_at, expires_at) = row;
    Nonce {
        id,
        user_id,
        token,
        action: action.unwrap_or_default(),
        salt,
        is_used,
        is_valid,
        created_at,
        expires_at,
    }
}

#[async_trait]
impl NonceStoreBackend for PostgresBackend {
    async fn save(&self, mut nonce: Nonce) -> NonceResult<Nonce> {
        let mut tx = self.pool.begin().await?;

        if nonce.is_unsaved() {
            nonce.id = Uuid::new_v4();
            sqlx::query(
                r#"INSERT INTO nonce
                   (id, user_id, token, action, salt, is_used, is_valid, created_at, expires_at)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
            )
            .bind(nonce.id)
            .bind(nonce.user_id)
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

            trace!("Inserted nonce {} into PostgreSQL", nonce.id);
            return Ok(nonce);
        }

        let stored = sqlx::query_as::<_, NonceRow>(&format!(
            "UPDATE nonce SET is_used = $1, is_valid = $2 WHERE id = $3 {RETURNING_COLUMNS}"
        ))
        .bind(nonce.is_used)
        .bind(nonce.is_valid)
        .bind(nonce.id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(stored.map(row_to_nonce).unwrap_or(nonce))
    }

    async fn get_by_token(&self, token: &str) -> NonceResult<Option<Nonce>> {
        let row = sqlx::query_as::<_, NonceRow>(&format!("{SELECT_COLUMNS} WHERE token = $1"))
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(row_to_nonce))
    }

    async fn list_by_action_and_user(
        &self,
        action: &str,
        user_id: Uuid,
    ) -> NonceResult<Vec<Nonce>> {
        let rows = sqlx::query_as::<_, NonceRow>(&format!(
            "{SELECT_COLUMNS} WHERE action = $1 AND user_id = $2"
        ))
        .bind(action)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_nonce).collect())
    }

    async fn consume_if_unused(&self, token: &str) -> NonceResult<Option<Nonce>> {
        // 单条 UPDATE 的行锁保证只有一个调用方能命中 is_used = FALSE
        let row = sqlx::query_as::<_, NonceRow>(&format!(
            "UPDATE nonce SET is_used = TRUE WHERE token = $1 AND is_used = FALSE {RETURNING_COLUMNS}"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_nonce))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> NonceResult<u64> {
        let result = sqlx::query("DELETE FROM nonce WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            debug!("Cleaned up {} expired nonces from PostgreSQL", deleted);
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
