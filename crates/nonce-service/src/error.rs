//! Nonce 服务错误定义

use thiserror::Error;

/// Nonce 服务错误类型
///
/// 校验类错误（`NoToken`、`InvalidToken` 等）原样返回给调用方，
/// 基础设施错误统一归入 `Database`。
#[derive(Error, Debug)]
pub enum NonceError {
    /// 未提供 token（空串或全空白）
    #[error("no token supplied")]
    NoToken,

    /// token 格式不合法，或 action / user / 有效性不匹配
    ///
    /// 三种不匹配情况对调用方不可区分，避免泄露具体哪个字段校验失败
    #[error("invalid token")]
    InvalidToken,

    /// token 已被消费
    #[error("duplicate submission")]
    TokenUsed,

    /// token 已过期
    #[error("token expired")]
    TokenExpired,

    /// token 不存在（或已被清理任务删除）
    #[error("token not found")]
    TokenNotFound,

    /// 随机源不可用等生成失败
    #[error("Token generation error: {0}")]
    Generation(String),

    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),
}

impl NonceError {
    /// 是否为调用方输入导致的错误（与基础设施故障相对）
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            NonceError::NoToken
                | NonceError::InvalidToken
                | NonceError::TokenUsed
                | NonceError::TokenExpired
                | NonceError::TokenNotFound
        )
    }

    /// 用作 metrics 标签的短名称
    pub fn kind(&self) -> &'static str {
        match self {
            NonceError::NoToken => "no_token",
            NonceError::InvalidToken => "invalid_token",
            NonceError::TokenUsed => "token_used",
            NonceError::TokenExpired => "token_expired",
            NonceError::TokenNotFound => "token_not_found",
            NonceError::Generation(_) => "generation",
            NonceError::Database(_) => "database",
            NonceError::Config(_) => "config",
        }
    }
}

/// Nonce 结果类型别名
pub type NonceResult<T> = Result<T, NonceError>;
