//! Token 生成与格式校验
//!
//! token = URL-safe Base64( SHA-512( "{action}::{user_id}::{unix_secs}::{salt}" ) )，
//! 其中 salt 为 16 字节安全随机数的标准 Base64 编码。

use crate::error::{NonceError, NonceResult};
use crate::types::{Nonce, TOKEN_LEN};
use base64::prelude::*;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha512};
use std::time::Duration;
use uuid::Uuid;

/// salt 原始字节数
const SALT_BYTES: usize = 16;

/// 以当前时间生成一个新的（未持久化的）nonce
pub fn generate(action: &str, user_id: Uuid, expires_in: Duration) -> NonceResult<Nonce> {
    generate_at(action, user_id, expires_in, Utc::now())
}

/// 以指定时间生成 nonce
///
/// `expires_at` 截断到秒；持久化存储可能丢失亚秒精度。
pub fn generate_at(
    action: &str,
    user_id: Uuid,
    expires_in: Duration,
    now: DateTime<Utc>,
) -> NonceResult<Nonce> {
    let mut raw_salt = [0u8; SALT_BYTES];
    OsRng
        .try_fill_bytes(&mut raw_salt)
        .map_err(|e| NonceError::Generation(format!("Random source unavailable: {e}")))?;
    let salt = BASE64_STANDARD.encode(raw_salt);

    let created_at = now.timestamp();
    let token = derive_token(action, user_id, created_at, &salt);

    let ttl = TimeDelta::from_std(expires_in)
        .map_err(|e| NonceError::Generation(format!("Invalid expiry duration: {e}")))?;
    let expires_at = now
        .checked_add_signed(ttl)
        .ok_or_else(|| NonceError::Generation("Expiry time out of range".into()))?
        .trunc_subsecs(0);

    Ok(Nonce {
        id: Uuid::nil(),
        user_id,
        token,
        action: action.to_string(),
        salt,
        is_used: false,
        is_valid: true,
        created_at,
        expires_at,
    })
}

/// 由 (action, user_id, 时间, salt) 派生 token
fn derive_token(action: &str, user_id: Uuid, unix_secs: i64, salt: &str) -> String {
    let raw = format!("{action}::{user_id}::{unix_secs}::{salt}");
    let digest = Sha512::digest(raw.as_bytes());
    BASE64_URL_SAFE.encode(digest)
}

/// 访问存储前对调用方提交的 token 做格式检查
pub fn check_token_shape(token: &str) -> NonceResult<()> {
    if token.trim().is_empty() {
        return Err(NonceError::NoToken);
    }
    if token.len() != TOKEN_LEN {
        return Err(NonceError::InvalidToken);
    }
    Ok(())
}
