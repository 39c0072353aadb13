//! nonce 表结构初始化
//!
//! 存储后端本身只执行 INSERT / UPDATE / SELECT / DELETE，
//! 建表由部署方或这里的初始化函数负责。

use crate::error::NonceResult;
use tracing::debug;

/// 表名
pub const NONCE_TABLE: &str = "nonce";

/// SQLite 建表语句
///
/// SQLite 没有原生 UUID 类型，ID 以 36 字符文本存储。
/// `expires_at` 声明为 DATETIME，内容是 UTC 时间文本。
const SQLITE_DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS nonce (
        id TEXT NOT NULL PRIMARY KEY,
        user_id TEXT NOT NULL,
        token CHAR(88) NOT NULL UNIQUE,
        action TEXT,
        salt CHAR(24) NOT NULL,
        is_used BOOLEAN NOT NULL DEFAULT 0,
        is_valid BOOLEAN NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL,
        expires_at DATETIME NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_nonce_user_action ON nonce(user_id, action)",
    "CREATE INDEX IF NOT EXISTS idx_nonce_expires_at ON nonce(expires_at)",
];

/// PostgreSQL 建表语句
#[cfg(feature = "backend-postgres")]
const POSTGRES_DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS nonce (
        id UUID NOT NULL PRIMARY KEY,
        user_id UUID NOT NULL,
        token CHAR(88) NOT NULL UNIQUE,
        action TEXT,
        salt CHAR(24) NOT NULL,
        is_used BOOLEAN NOT NULL DEFAULT FALSE,
        is_valid BOOLEAN NOT NULL DEFAULT TRUE,
        created_at BIGINT NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_nonce_user_action ON nonce(user_id, action)",
    "CREATE INDEX IF NOT EXISTS idx_nonce_expires_at ON nonce(expires_at)",
];

/// 在 SQLite 中创建 nonce 表及索引（幂等）
pub async fn provision_sqlite(pool: &sqlx::SqlitePool) -> NonceResult<()> {
    for ddl in SQLITE_DDL {
        sqlx::query(ddl).execute(pool).await?;
    }
    debug!("SQLite {} table and indexes initialized", NONCE_TABLE);
    Ok(())
}

/// 在 PostgreSQL 中创建 nonce 表及索引（幂等）
#[cfg(feature = "backend-postgres")]
pub async fn provision_postgres(pool: &sqlx::PgPool) -> NonceResult<()> {
    for ddl in POSTGRES_DDL {
        sqlx::query(ddl).execute(pool).await?;
    }
    debug!("PostgreSQL {} table and indexes initialized", NONCE_TABLE);
    Ok(())
}
